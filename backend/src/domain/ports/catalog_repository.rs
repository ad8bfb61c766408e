//! Port for the organization forest and research-protocol catalog.

use async_trait::async_trait;

use super::StoreError;
use crate::domain::organization::{Organization, OrganizationId};
use crate::domain::protocol::{OrgProtocolRow, ResearchProtocol};

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// Every organization row; callers build an [`crate::domain::organization::OrgTree`]
    /// over the snapshot.
    async fn organizations(&self) -> Result<Vec<Organization>, StoreError>;

    /// Protocol association rows for one organization, retired rows included.
    async fn protocol_rows(&self, org: OrganizationId)
        -> Result<Vec<OrgProtocolRow>, StoreError>;

    async fn protocols(&self) -> Result<Vec<ResearchProtocol>, StoreError>;

    async fn save_organization(&self, org: Organization) -> Result<Organization, StoreError>;

    async fn save_protocol_row(&self, row: OrgProtocolRow) -> Result<OrgProtocolRow, StoreError>;
}

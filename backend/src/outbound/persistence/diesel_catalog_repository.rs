//! Diesel-backed organization and research-protocol catalog.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::error_mapping::{map_diesel_error, map_pool_error};
use super::models::{
    org_protocol_to_row, organization_to_row, row_to_org_protocol, row_to_organization,
    row_to_protocol, OrgProtocolDbRow, OrganizationRow, ProtocolRow,
};
use super::pool::DbPool;
use super::schema::{org_protocols, organizations, research_protocols};
use crate::domain::organization::{Organization, OrganizationId};
use crate::domain::ports::{CatalogRepository, StoreError};
use crate::domain::protocol::{OrgProtocolRow, ResearchProtocol};

#[derive(Clone)]
pub struct DieselCatalogRepository {
    pool: DbPool,
}

impl DieselCatalogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for DieselCatalogRepository {
    async fn organizations(&self) -> Result<Vec<Organization>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<OrganizationRow> = organizations::table
            .order(organizations::id.asc())
            .select(OrganizationRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(row_to_organization).collect())
    }

    async fn protocol_rows(
        &self,
        org: OrganizationId,
    ) -> Result<Vec<OrgProtocolRow>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<OrgProtocolDbRow> = org_protocols::table
            .filter(org_protocols::organization_id.eq(org.value()))
            .select(OrgProtocolDbRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(row_to_org_protocol).collect())
    }

    async fn protocols(&self) -> Result<Vec<ResearchProtocol>, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let rows: Vec<ProtocolRow> = research_protocols::table
            .order(research_protocols::id.asc())
            .select(ProtocolRow::as_select())
            .load(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(rows.into_iter().map(row_to_protocol).collect())
    }

    async fn save_organization(&self, org: Organization) -> Result<Organization, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = organization_to_row(&org);
        let stored: OrganizationRow = diesel::insert_into(organizations::table)
            .values(&row)
            .on_conflict(organizations::id)
            .do_update()
            .set(&row)
            .returning(OrganizationRow::as_returning())
            .get_result(&mut conn)
            .await
            .map_err(map_diesel_error)?;
        Ok(row_to_organization(stored))
    }

    async fn save_protocol_row(&self, row: OrgProtocolRow) -> Result<OrgProtocolRow, StoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        // Retirement updates the existing association in place.
        let updated = diesel::update(
            org_protocols::table
                .filter(org_protocols::organization_id.eq(row.organization_id.value()))
                .filter(org_protocols::protocol_id.eq(row.protocol_id.value())),
        )
        .set(org_protocols::retired_as_of.eq(row.retired_as_of))
        .execute(&mut conn)
        .await
        .map_err(map_diesel_error)?;
        if updated == 0 {
            diesel::insert_into(org_protocols::table)
                .values(&org_protocol_to_row(&row))
                .execute(&mut conn)
                .await
                .map_err(map_diesel_error)?;
        }
        Ok(row)
    }
}

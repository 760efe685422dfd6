// src/storage/postgres.rs
use anyhow::bail;
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use uuid::Uuid;

use crate::domain::{
    AuthorityId, FieldSet, Policy, PolicyField, PolicyId, Rule, SecondaryId, ServiceId,
};

use super::traits::{PolicyRepository, ReferenceLookup};

const POLICY_COLUMNS: &str = r#"
    id, name, services, authorities, roles, rules, keybase_mode,
    admin_secondary, user_secondary, proxy_secondary, authority_secondary,
    admin_device, user_device, proxy_device, authority_device
"#;

/// PostgreSQL implementation of the storage traits.
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Create a new PostgresStorage instance with a connection pool.
    pub async fn connect(
        database_url: &str,
        min_connections: u32,
        max_connections: u32,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(min_connections)
            .max_connections(max_connections)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Ids from `ids` with no row in `table`.
    async fn missing_ids(&self, table: &'static str, ids: Vec<Uuid>) -> anyhow::Result<Vec<Uuid>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!("SELECT id FROM {} WHERE id = ANY($1)", table);
        let found: HashSet<Uuid> = sqlx::query_scalar::<_, Uuid>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .collect();

        Ok(ids.into_iter().filter(|id| !found.contains(id)).collect())
    }
}

fn policy_from_row(row: &PgRow) -> anyhow::Result<Policy> {
    let services: Vec<Uuid> = row.try_get("services")?;
    let authorities: Vec<Uuid> = row.try_get("authorities")?;
    let roles: Vec<String> = row.try_get("roles")?;
    let Json(rules): Json<BTreeMap<String, Rule>> = row.try_get("rules")?;

    let secondary = |column: &str| -> anyhow::Result<Option<SecondaryId>> {
        let id: Option<Uuid> = row.try_get(column)?;
        Ok(id.map(SecondaryId))
    };

    Ok(Policy {
        id: PolicyId(row.try_get("id")?),
        name: row.try_get("name")?,
        services: services.into_iter().map(ServiceId).collect(),
        authorities: authorities.into_iter().map(AuthorityId).collect(),
        roles: roles.into_iter().collect(),
        rules,
        keybase_mode: row.try_get("keybase_mode")?,
        admin_secondary: secondary("admin_secondary")?,
        user_secondary: secondary("user_secondary")?,
        proxy_secondary: secondary("proxy_secondary")?,
        authority_secondary: secondary("authority_secondary")?,
        admin_device: row.try_get("admin_device")?,
        user_device: row.try_get("user_device")?,
        proxy_device: row.try_get("proxy_device")?,
        authority_device: row.try_get("authority_device")?,
    })
}

fn uuids<T: Copy + Into<Uuid>>(ids: &BTreeSet<T>) -> Vec<Uuid> {
    ids.iter().map(|id| (*id).into()).collect()
}

/// Append `column = $n` for one field to an UPDATE's SET list.
fn push_field<'a>(
    set: &mut sqlx::query_builder::Separated<'_, 'a, Postgres, &'static str>,
    policy: &Policy,
    field: PolicyField,
) {
    set.push(field.as_str());
    set.push_unseparated(" = ");

    match field {
        PolicyField::Name => set.push_bind_unseparated(policy.name.clone()),
        PolicyField::Services => set.push_bind_unseparated(uuids(&policy.services)),
        PolicyField::Authorities => set.push_bind_unseparated(uuids(&policy.authorities)),
        PolicyField::Roles => {
            set.push_bind_unseparated(policy.roles.iter().cloned().collect::<Vec<String>>())
        }
        PolicyField::Rules => set.push_bind_unseparated(Json(policy.rules.clone())),
        PolicyField::KeybaseMode => set.push_bind_unseparated(policy.keybase_mode.clone()),
        PolicyField::AdminSecondary => {
            set.push_bind_unseparated(policy.admin_secondary.map(|id| id.0))
        }
        PolicyField::UserSecondary => set.push_bind_unseparated(policy.user_secondary.map(|id| id.0)),
        PolicyField::ProxySecondary => {
            set.push_bind_unseparated(policy.proxy_secondary.map(|id| id.0))
        }
        PolicyField::AuthoritySecondary => {
            set.push_bind_unseparated(policy.authority_secondary.map(|id| id.0))
        }
        PolicyField::AdminDevice => set.push_bind_unseparated(policy.admin_device),
        PolicyField::UserDevice => set.push_bind_unseparated(policy.user_device),
        PolicyField::ProxyDevice => set.push_bind_unseparated(policy.proxy_device),
        PolicyField::AuthorityDevice => set.push_bind_unseparated(policy.authority_device),
    };
}

/// `UPDATE` overwriting exactly `fields` of one policy. The id is only
/// ever used in the `WHERE` clause.
fn update_query(
    id: PolicyId,
    policy: &Policy,
    fields: &FieldSet,
) -> QueryBuilder<'static, Postgres> {
    let mut builder = QueryBuilder::new("UPDATE policies SET ");
    {
        let mut set = builder.separated(", ");
        for field in fields.iter() {
            push_field(&mut set, policy, field);
        }
        set.push("updated_at = now()");
    }
    builder.push(" WHERE id = ");
    builder.push_bind(id.0);
    builder
}

#[async_trait]
impl PolicyRepository for PostgresStorage {
    async fn insert(&self, policy: &Policy) -> anyhow::Result<PolicyId> {
        let id = PolicyId::new();

        sqlx::query(
            r#"
            INSERT INTO policies (
                id, name, services, authorities, roles, rules, keybase_mode,
                admin_secondary, user_secondary, proxy_secondary, authority_secondary,
                admin_device, user_device, proxy_device, authority_device
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(id.0)
        .bind(&policy.name)
        .bind(uuids(&policy.services))
        .bind(uuids(&policy.authorities))
        .bind(policy.roles.iter().cloned().collect::<Vec<String>>())
        .bind(Json(&policy.rules))
        .bind(&policy.keybase_mode)
        .bind(policy.admin_secondary.map(|id| id.0))
        .bind(policy.user_secondary.map(|id| id.0))
        .bind(policy.proxy_secondary.map(|id| id.0))
        .bind(policy.authority_secondary.map(|id| id.0))
        .bind(policy.admin_device)
        .bind(policy.user_device)
        .bind(policy.proxy_device)
        .bind(policy.authority_device)
        .execute(&self.pool)
        .await?;

        Ok(id)
    }

    async fn get(&self, id: PolicyId) -> anyhow::Result<Option<Policy>> {
        let sql = format!("SELECT {} FROM policies WHERE id = $1", POLICY_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(policy_from_row(&row)?))
    }

    async fn get_all(&self) -> anyhow::Result<Vec<Policy>> {
        let sql = format!("SELECT {} FROM policies ORDER BY created_at, id", POLICY_COLUMNS);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(policy_from_row).collect()
    }

    async fn replace(
        &self,
        id: PolicyId,
        policy: &Policy,
        fields: &FieldSet,
    ) -> anyhow::Result<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut builder = update_query(id, policy, fields);
        let result = builder.build().execute(&self.pool).await?;
        if result.rows_affected() == 0 {
            bail!("policy {} not found", id);
        }

        Ok(())
    }

    async fn remove(&self, id: PolicyId) -> anyhow::Result<bool> {
        let result = sqlx::query(
            r#"
            DELETE FROM policies
            WHERE id = $1
            "#,
        )
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ReferenceLookup for PostgresStorage {
    async fn missing_services(&self, ids: &BTreeSet<ServiceId>) -> anyhow::Result<Vec<ServiceId>> {
        let missing = self.missing_ids("services", uuids(ids)).await?;
        Ok(missing.into_iter().map(ServiceId).collect())
    }

    async fn missing_authorities(
        &self,
        ids: &BTreeSet<AuthorityId>,
    ) -> anyhow::Result<Vec<AuthorityId>> {
        let missing = self.missing_ids("authorities", uuids(ids)).await?;
        Ok(missing.into_iter().map(AuthorityId).collect())
    }

    async fn missing_secondaries(
        &self,
        ids: &BTreeSet<SecondaryId>,
    ) -> anyhow::Result<Vec<SecondaryId>> {
        let missing = self.missing_ids("secondaries", uuids(ids)).await?;
        Ok(missing.into_iter().map(SecondaryId).collect())
    }
}

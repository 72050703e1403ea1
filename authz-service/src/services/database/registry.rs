use async_trait::async_trait;
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

use super::Database;
use crate::models::{
    Application, Authorization, AuthorizationSpec, CatalogueAuthorization, Component,
    Confidentiality, Credential, ResourceType,
};
use crate::services::metrics::QueryTimer;
use crate::services::references::ReferenceResolver;
use crate::services::registry::{plan_spec_rows, RegistryStore};
use crate::services::AuthzError;

#[derive(FromRow)]
struct AuthorizationRow {
    authorization_id: Uuid,
    application_id: Uuid,
    component: Component,
    scopes: Vec<String>,
    type_url: String,
    max_confidentiality: Option<Confidentiality>,
}

impl From<AuthorizationRow> for Authorization {
    fn from(row: AuthorizationRow) -> Self {
        Authorization {
            authorization_id: row.authorization_id,
            application_id: row.application_id,
            component: row.component,
            scopes: row.scopes.into_iter().collect(),
            type_url: row.type_url,
            max_confidentiality: row.max_confidentiality,
        }
    }
}

#[derive(FromRow)]
struct CatalogueRow {
    application_id: Uuid,
    component: Component,
    catalogue_id: Uuid,
    scopes: Vec<String>,
    max_confidentiality: Option<Confidentiality>,
}

impl From<CatalogueRow> for CatalogueAuthorization {
    fn from(row: CatalogueRow) -> Self {
        CatalogueAuthorization {
            application_id: row.application_id,
            component: row.component,
            catalogue_id: row.catalogue_id,
            scopes: row.scopes.into_iter().collect(),
            max_confidentiality: row.max_confidentiality,
        }
    }
}

const AUTHORIZATION_COLUMNS: &str =
    "authorization_id, application_id, component, scopes, type_url, max_confidentiality";
const APPLICATION_COLUMNS: &str = "application_id, client_ids, label, unrestricted, created_utc";
const RESOURCE_TYPE_COLUMNS: &str = "type_id, component, catalogue_id, identification, created_utc";

async fn upsert_authorization(
    conn: &mut PgConnection,
    row: &Authorization,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO authorizations
            (authorization_id, application_id, component, scopes, type_url, max_confidentiality)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (application_id, component, type_url)
        DO UPDATE SET scopes = EXCLUDED.scopes,
                      max_confidentiality = EXCLUDED.max_confidentiality
        "#,
    )
    .bind(row.authorization_id)
    .bind(row.application_id)
    .bind(row.component)
    .bind(row.scopes.iter().cloned().collect::<Vec<_>>())
    .bind(&row.type_url)
    .bind(row.max_confidentiality)
    .execute(conn)
    .await?;
    Ok(())
}

async fn rows_of(
    conn: &mut PgConnection,
    application_id: Uuid,
    component: Component,
) -> Result<Vec<Authorization>, sqlx::Error> {
    let rows = sqlx::query_as::<_, AuthorizationRow>(&format!(
        "SELECT {} FROM authorizations WHERE application_id = $1 AND component = $2 FOR UPDATE",
        AUTHORIZATION_COLUMNS
    ))
    .bind(application_id)
    .bind(component)
    .fetch_all(conn)
    .await?;
    Ok(rows.into_iter().map(Authorization::from).collect())
}

#[async_trait]
impl RegistryStore for Database {
    #[instrument(skip(self))]
    async fn credential_secret(&self, client_id: &str) -> Result<Option<String>, AuthzError> {
        let _timer = QueryTimer::start("credential_secret");
        let secret = sqlx::query_scalar::<_, String>(
            "SELECT secret FROM credentials WHERE client_id = $1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(secret)
    }

    #[instrument(skip(self, credential), fields(client_id = %credential.client_id))]
    async fn save_credential(&self, credential: &Credential) -> Result<(), AuthzError> {
        let _timer = QueryTimer::start("save_credential");
        sqlx::query(
            r#"
            INSERT INTO credentials (client_id, secret, created_utc)
            VALUES ($1, $2, NOW())
            ON CONFLICT (client_id) DO UPDATE SET secret = EXCLUDED.secret
            "#,
        )
        .bind(&credential.client_id)
        .bind(&credential.secret)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_credential(&self, client_id: &str) -> Result<bool, AuthzError> {
        let _timer = QueryTimer::start("delete_credential");
        let result = sqlx::query("DELETE FROM credentials WHERE client_id = $1")
            .bind(client_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn applications_for(&self, client_id: &str) -> Result<Vec<Application>, AuthzError> {
        let _timer = QueryTimer::start("applications_for");
        let apps = sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM applications WHERE $1 = ANY(client_ids)",
            APPLICATION_COLUMNS
        ))
        .bind(client_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(apps)
    }

    #[instrument(skip(self))]
    async fn application(&self, application_id: Uuid) -> Result<Option<Application>, AuthzError> {
        let app = sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM applications WHERE application_id = $1",
            APPLICATION_COLUMNS
        ))
        .bind(application_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(app)
    }

    #[instrument(skip(self))]
    async fn list_applications(&self) -> Result<Vec<Application>, AuthzError> {
        let apps = sqlx::query_as::<_, Application>(&format!(
            "SELECT {} FROM applications ORDER BY label",
            APPLICATION_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(apps)
    }

    #[instrument(skip(self, application, rows), fields(application_id = %application.application_id, rows = rows.len()))]
    async fn save_application(
        &self,
        application: &Application,
        rows: &[Authorization],
    ) -> Result<(), AuthzError> {
        let _timer = QueryTimer::start("save_application");
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent writers for the client_id uniqueness check.
        sqlx::query("LOCK TABLE applications IN SHARE ROW EXCLUSIVE MODE")
            .execute(&mut *tx)
            .await?;

        let taken = sqlx::query_scalar::<_, Uuid>(
            "SELECT application_id FROM applications \
             WHERE client_ids && $1 AND application_id <> $2 LIMIT 1",
        )
        .bind(&application.client_ids)
        .bind(application.application_id)
        .fetch_optional(&mut *tx)
        .await?;
        if let Some(other) = taken {
            return Err(AuthzError::Conflict(format!(
                "client_id already used by application {}",
                other
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO applications (application_id, client_ids, label, unrestricted, created_utc)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (application_id)
            DO UPDATE SET client_ids = EXCLUDED.client_ids,
                          label = EXCLUDED.label,
                          unrestricted = EXCLUDED.unrestricted
            "#,
        )
        .bind(application.application_id)
        .bind(&application.client_ids)
        .bind(&application.label)
        .bind(application.unrestricted)
        .bind(application.created_utc)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM authorizations WHERE application_id = $1")
            .bind(application.application_id)
            .execute(&mut *tx)
            .await?;

        if !rows.is_empty() {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(format!(
                "INSERT INTO authorizations ({}) ",
                AUTHORIZATION_COLUMNS
            ));
            qb.push_values(rows, |mut b, row| {
                b.push_bind(row.authorization_id)
                    .push_bind(row.application_id)
                    .push_bind(row.component)
                    .push_bind(row.scopes.iter().cloned().collect::<Vec<_>>())
                    .push_bind(row.type_url.clone())
                    .push_bind(row.max_confidentiality);
            });
            qb.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_application(&self, application_id: Uuid) -> Result<bool, AuthzError> {
        let _timer = QueryTimer::start("delete_application");
        let result = sqlx::query("DELETE FROM applications WHERE application_id = $1")
            .bind(application_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn authorizations_of(
        &self,
        application_id: Uuid,
        component: Component,
    ) -> Result<Vec<Authorization>, AuthzError> {
        let _timer = QueryTimer::start("authorizations_of");
        let rows = sqlx::query_as::<_, AuthorizationRow>(&format!(
            "SELECT {} FROM authorizations WHERE application_id = $1 AND component = $2 \
             ORDER BY type_url",
            AUTHORIZATION_COLUMNS
        ))
        .bind(application_id)
        .bind(component)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Authorization::from).collect())
    }

    #[instrument(skip(self))]
    async fn all_authorizations_of(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Authorization>, AuthzError> {
        let rows = sqlx::query_as::<_, AuthorizationRow>(&format!(
            "SELECT {} FROM authorizations WHERE application_id = $1 \
             ORDER BY component, type_url",
            AUTHORIZATION_COLUMNS
        ))
        .bind(application_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Authorization::from).collect())
    }

    #[instrument(skip(self))]
    async fn catalogue_authorizations_of(
        &self,
        application_id: Uuid,
        component: Component,
    ) -> Result<Vec<CatalogueAuthorization>, AuthzError> {
        let _timer = QueryTimer::start("catalogue_authorizations_of");
        let rows = sqlx::query_as::<_, CatalogueRow>(
            "SELECT application_id, component, catalogue_id, scopes, max_confidentiality \
             FROM catalogue_authorizations WHERE application_id = $1 AND component = $2",
        )
        .bind(application_id)
        .bind(component)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(CatalogueAuthorization::from).collect())
    }

    #[instrument(skip(self, grant), fields(application_id = %grant.application_id, catalogue_id = %grant.catalogue_id))]
    async fn save_catalogue_authorization(
        &self,
        grant: &CatalogueAuthorization,
    ) -> Result<(), AuthzError> {
        sqlx::query(
            r#"
            INSERT INTO catalogue_authorizations
                (application_id, component, catalogue_id, scopes, max_confidentiality)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (application_id, component, catalogue_id)
            DO UPDATE SET scopes = EXCLUDED.scopes,
                          max_confidentiality = EXCLUDED.max_confidentiality
            "#,
        )
        .bind(grant.application_id)
        .bind(grant.component)
        .bind(grant.catalogue_id)
        .bind(grant.scopes.iter().cloned().collect::<Vec<_>>())
        .bind(grant.max_confidentiality)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn resource_type(&self, type_id: Uuid) -> Result<Option<ResourceType>, AuthzError> {
        let resource_type = sqlx::query_as::<_, ResourceType>(&format!(
            "SELECT {} FROM resource_types WHERE type_id = $1",
            RESOURCE_TYPE_COLUMNS
        ))
        .bind(type_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(resource_type)
    }

    #[instrument(skip(self))]
    async fn types_in_catalogue(
        &self,
        catalogue_id: Uuid,
        component: Component,
    ) -> Result<Vec<ResourceType>, AuthzError> {
        let _timer = QueryTimer::start("types_in_catalogue");
        let types = sqlx::query_as::<_, ResourceType>(&format!(
            "SELECT {} FROM resource_types WHERE catalogue_id = $1 AND component = $2",
            RESOURCE_TYPE_COLUMNS
        ))
        .bind(catalogue_id)
        .bind(component)
        .fetch_all(&self.pool)
        .await?;
        Ok(types)
    }

    #[instrument(skip(self, resource_type, references), fields(type_id = %resource_type.type_id))]
    async fn create_resource_type(
        &self,
        resource_type: &ResourceType,
        references: &ReferenceResolver,
    ) -> Result<(), AuthzError> {
        let _timer = QueryTimer::start("create_resource_type");
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "INSERT INTO resource_types ({}) VALUES ($1, $2, $3, $4, $5)",
            RESOURCE_TYPE_COLUMNS
        ))
        .bind(resource_type.type_id)
        .bind(resource_type.component)
        .bind(resource_type.catalogue_id)
        .bind(&resource_type.identification)
        .bind(resource_type.created_utc)
        .execute(&mut *tx)
        .await?;

        let specs = sqlx::query_as::<_, SpecRow>(
            "SELECT application_id, component, scopes, max_confidentiality \
             FROM authorization_specs WHERE component = $1",
        )
        .bind(resource_type.component)
        .fetch_all(&mut *tx)
        .await?;

        for spec in specs.into_iter().map(AuthorizationSpec::from) {
            let existing = rows_of(&mut tx, spec.application_id, spec.component).await?;
            for row in plan_spec_rows(
                &spec,
                &existing,
                std::slice::from_ref(resource_type),
                references,
            ) {
                upsert_authorization(&mut tx, &row).await?;
            }
        }

        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self, spec, references), fields(application_id = %spec.application_id, component = %spec.component))]
    async fn save_authorization_spec(
        &self,
        spec: &AuthorizationSpec,
        references: &ReferenceResolver,
    ) -> Result<usize, AuthzError> {
        let _timer = QueryTimer::start("save_authorization_spec");
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO authorization_specs (application_id, component, scopes, max_confidentiality)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (application_id, component)
            DO UPDATE SET scopes = EXCLUDED.scopes,
                          max_confidentiality = EXCLUDED.max_confidentiality
            "#,
        )
        .bind(spec.application_id)
        .bind(spec.component)
        .bind(spec.scopes.iter().cloned().collect::<Vec<_>>())
        .bind(spec.max_confidentiality)
        .execute(&mut *tx)
        .await?;

        let types = sqlx::query_as::<_, ResourceType>(&format!(
            "SELECT {} FROM resource_types WHERE component = $1",
            RESOURCE_TYPE_COLUMNS
        ))
        .bind(spec.component)
        .fetch_all(&mut *tx)
        .await?;
        let existing = rows_of(&mut tx, spec.application_id, spec.component).await?;

        let rows = plan_spec_rows(spec, &existing, &types, references);
        for row in &rows {
            upsert_authorization(&mut tx, row).await?;
        }

        tx.commit().await?;
        Ok(rows.len())
    }

    async fn ping(&self) -> Result<(), AuthzError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[derive(FromRow)]
struct SpecRow {
    application_id: Uuid,
    component: Component,
    scopes: Vec<String>,
    max_confidentiality: Option<Confidentiality>,
}

impl From<SpecRow> for AuthorizationSpec {
    fn from(row: SpecRow) -> Self {
        AuthorizationSpec {
            application_id: row.application_id,
            component: row.component,
            scopes: row.scopes.into_iter().collect(),
            max_confidentiality: row.max_confidentiality,
        }
    }
}

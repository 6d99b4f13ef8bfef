use async_trait::async_trait;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    error::Result,
    storage::{Assessment, AssessmentStore, NewAssessment},
};

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS assessments (
    id UUID PRIMARY KEY,
    patient_name TEXT NOT NULL,
    patient_email TEXT NOT NULL,
    notes TEXT NOT NULL,
    esi_level INTEGER NOT NULL,
    diagnosis TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

/// PostgreSQL implementation of AssessmentStore
pub struct PostgresAssessmentStore {
    pool: Arc<PgPool>,
}

impl PostgresAssessmentStore {
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        info!("Connected to PostgreSQL assessment store");

        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl AssessmentStore for PostgresAssessmentStore {
    async fn insert_assessment(&self, assessment: NewAssessment) -> Result<Uuid> {
        let assessment = assessment.into_assessment();

        sqlx::query(
            r#"
            INSERT INTO assessments
                (id, patient_name, patient_email, notes, esi_level, diagnosis, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(assessment.id)
        .bind(&assessment.patient_name)
        .bind(&assessment.patient_email)
        .bind(&assessment.notes)
        .bind(assessment.esi_level)
        .bind(&assessment.diagnosis)
        .bind(assessment.created_at)
        .execute(&*self.pool)
        .await?;

        Ok(assessment.id)
    }

    async fn list_assessments(&self) -> Result<Vec<Assessment>> {
        let rows = sqlx::query_as::<_, Assessment>(
            r#"
            SELECT id, patient_name, patient_email, notes, esi_level, diagnosis, created_at
            FROM assessments
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows)
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::Result;

/// A persisted triage result. Never mutated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Assessment {
    pub id: Uuid,
    pub patient_name: String,
    pub patient_email: String,
    pub notes: String,
    pub esi_level: i32,
    pub diagnosis: String,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the intake flow; the store assigns id and timestamp
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAssessment {
    pub notes: String,
    pub esi_level: i32,
    pub diagnosis: String,
    pub patient_name: String,
    pub patient_email: String,
}

impl NewAssessment {
    pub(crate) fn into_assessment(self) -> Assessment {
        Assessment {
            id: Uuid::new_v4(),
            patient_name: self.patient_name,
            patient_email: self.patient_email,
            notes: self.notes,
            esi_level: self.esi_level,
            diagnosis: self.diagnosis,
            created_at: Utc::now(),
        }
    }
}

/// Trait for storing and listing assessments.
///
/// Writes from concurrent conversations are independent; implementations are
/// responsible for serializing them safely.
#[async_trait]
pub trait AssessmentStore: Send + Sync {
    async fn insert_assessment(&self, assessment: NewAssessment) -> Result<Uuid>;
    /// All assessments, newest first
    async fn list_assessments(&self) -> Result<Vec<Assessment>>;
}

/// In-memory implementation of AssessmentStore
#[derive(Default)]
pub struct InMemoryAssessmentStore {
    assessments: Arc<DashMap<Uuid, Assessment>>,
}

impl InMemoryAssessmentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AssessmentStore for InMemoryAssessmentStore {
    async fn insert_assessment(&self, assessment: NewAssessment) -> Result<Uuid> {
        let assessment = assessment.into_assessment();
        let id = assessment.id;
        self.assessments.insert(id, assessment);
        Ok(id)
    }

    async fn list_assessments(&self) -> Result<Vec<Assessment>> {
        let mut all: Vec<Assessment> = self
            .assessments
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }
}

/// Metric model: pre-aggregated read model
///
/// Rows are written by an external aggregation job. This crate only reads them
/// (see [`crate::analytics::query_metrics`]).
///
/// # Schema
///
/// ```sql
/// CREATE TABLE metrics (
///     id UUID PRIMARY KEY,
///     project_id UUID NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
///     metric_type metric_type NOT NULL,
///     period period_type NOT NULL,
///     period_start TIMESTAMPTZ NOT NULL,
///     value DOUBLE PRECISION NOT NULL,
///     dimensions JSONB NOT NULL DEFAULT '{}'::jsonb,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     deleted_at TIMESTAMPTZ
/// );
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// What a metric measures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "metric_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum MetricType {
    /// Daily active users
    Dau,
    /// Monthly active users
    Mau,
    NewUsers,
    SessionCount,
    SessionLength,
    EventCount,
    RetentionRate,
}

/// Aggregation window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "period_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
    Total,
}

/// A stored metric value
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Metric {
    pub id: Uuid,
    pub project_id: Uuid,
    pub metric_type: MetricType,
    pub period: PeriodType,
    pub period_start: DateTime<Utc>,
    pub value: f64,
    /// Breakdown tags such as platform or country
    pub dimensions: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing, default)]
    pub deleted_at: Option<DateTime<Utc>>,
}

pub(crate) const METRIC_COLUMNS: &str = "id, project_id, metric_type, period, period_start, \
     value, dimensions, created_at, updated_at, deleted_at";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_type_wire_names() {
        let names: Vec<String> = [
            MetricType::Dau,
            MetricType::Mau,
            MetricType::NewUsers,
            MetricType::SessionCount,
            MetricType::SessionLength,
            MetricType::EventCount,
            MetricType::RetentionRate,
        ]
        .iter()
        .map(|m| serde_json::to_value(m).unwrap().as_str().unwrap().to_string())
        .collect();

        assert_eq!(
            names,
            vec![
                "dau",
                "mau",
                "new_users",
                "session_count",
                "session_length",
                "event_count",
                "retention_rate"
            ]
        );
    }

    #[test]
    fn test_period_type_rejects_unknown() {
        assert_eq!(
            serde_json::from_str::<PeriodType>("\"weekly\"").unwrap(),
            PeriodType::Weekly
        );
        assert!(serde_json::from_str::<PeriodType>("\"fortnightly\"").is_err());
    }
}

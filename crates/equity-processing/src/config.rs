//! Configuration types for the equity pipeline.
//!
//! This module provides configuration options using the builder pattern
//! for flexible and ergonomic pipeline setup. The configuration is
//! serde-compatible so a presentation layer can send it as JSON.

use crate::utils::parse_date_str;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Default multiplier applied to the IQR when flagging outliers.
pub const DEFAULT_OUTLIER_MULTIPLIER: f64 = 2.5;

/// Default minimum share (percent) a category needs to be kept.
pub const DEFAULT_FREQUENCY_THRESHOLD_PCT: f64 = 3.0;

/// Default policy-change date.
pub const DEFAULT_CUTOFF_DATE: &str = "2028-03-01";

/// Names of the derived indicator columns.
pub const REPORTED_COLUMN: &str = "reported";
pub const TEST_POSITIVE_COLUMN: &str = "test_positive";
pub const TEST_ORDERED_COLUMN: &str = "test_ordered";

/// Mapping from semantic roles to column names in the source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnRoles {
    /// Unique record identifier, used to report and remove outliers.
    pub id_column: String,

    /// Numeric column checked for outliers. `None` skips outlier detection.
    pub numeric_column: Option<String>,

    /// Categorical sensitive attribute the metrics are grouped by.
    pub sensitive_column: String,

    /// Columns whose presence marks a record as reported.
    pub output_columns: Vec<String>,

    /// Substring identifying test-result columns (e.g. `fentanyl_detected`).
    pub detected_marker: String,

    /// Column whose presence marks a test as ordered.
    pub collection_date_column: String,

    /// Date column used for the before/after split. Required.
    pub partition_date_column: String,
}

impl Default for ColumnRoles {
    fn default() -> Self {
        Self {
            id_column: "encounter_id".to_string(),
            numeric_column: Some("maternal_age".to_string()),
            sensitive_column: "maternal_race".to_string(),
            output_columns: vec!["cps_reporting_date".to_string()],
            detected_marker: "detected".to_string(),
            collection_date_column: "uds_collection_date".to_string(),
            partition_date_column: "uds_collection_date".to_string(),
        }
    }
}

/// The two groups compared by the demographic parity ratio (`a / b`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceGroups {
    pub group_a: String,
    pub group_b: String,
}

impl ReferenceGroups {
    pub fn new(group_a: impl Into<String>, group_b: impl Into<String>) -> Self {
        Self {
            group_a: group_a.into(),
            group_b: group_b.into(),
        }
    }
}

/// Configuration for the equity pipeline.
///
/// Use [`EquityConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use equity_processing::config::{EquityConfig, ReferenceGroups};
///
/// let config = EquityConfig::builder()
///     .outlier_multiplier(1.5)
///     .frequency_threshold_pct(5.0)
///     .parity_reference_groups(ReferenceGroups::new("Black", "White"))
///     .build()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquityConfig {
    /// Multiplier `k` for the IQR outlier bounds. Must be > 0.
    /// Default: 2.5
    pub outlier_multiplier: f64,

    /// Whether flagged outlier records are removed before filtering.
    /// Default: true
    pub remove_outliers: bool,

    /// Categories with a share at or below this percentage are dropped (0 - 100).
    /// Default: 3.0
    pub frequency_threshold_pct: f64,

    /// Policy-change date; records on or after it fall in the `after` window.
    /// Default: "2028-03-01"
    pub partition_cutoff_date: String,

    /// Fail on unparseable dates instead of excluding the rows.
    /// Default: false
    pub strict_dates: bool,

    /// Column-role mapping.
    pub columns: ColumnRoles,

    /// Indicator treated as ground truth by the metrics engine.
    /// Default: "test_positive"
    pub ground_truth_column: String,

    /// Indicator treated as the prediction by the metrics engine.
    /// Default: "test_ordered"
    pub predicted_column: String,

    /// Groups compared by the demographic parity ratio. `None` skips parity.
    /// Default: None
    pub parity_reference_groups: Option<ReferenceGroups>,
}

impl Default for EquityConfig {
    fn default() -> Self {
        Self {
            outlier_multiplier: DEFAULT_OUTLIER_MULTIPLIER,
            remove_outliers: true,
            frequency_threshold_pct: DEFAULT_FREQUENCY_THRESHOLD_PCT,
            partition_cutoff_date: DEFAULT_CUTOFF_DATE.to_string(),
            strict_dates: false,
            columns: ColumnRoles::default(),
            ground_truth_column: TEST_POSITIVE_COLUMN.to_string(),
            predicted_column: TEST_ORDERED_COLUMN.to_string(),
            parity_reference_groups: None,
        }
    }
}

impl EquityConfig {
    /// Create a new configuration builder.
    pub fn builder() -> EquityConfigBuilder {
        EquityConfigBuilder::default()
    }

    /// Parse a configuration from JSON, filling unspecified fields with defaults.
    pub fn from_json(json: &str) -> crate::error::Result<Self> {
        let config: EquityConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// The parsed partition cutoff date.
    pub fn cutoff_date(&self) -> Result<NaiveDate, ConfigValidationError> {
        parse_date_str(&self.partition_cutoff_date)
            .ok_or_else(|| ConfigValidationError::InvalidCutoffDate(self.partition_cutoff_date.clone()))
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !self.outlier_multiplier.is_finite() || self.outlier_multiplier <= 0.0 {
            return Err(ConfigValidationError::InvalidMultiplier(
                self.outlier_multiplier,
            ));
        }

        if !(0.0..=100.0).contains(&self.frequency_threshold_pct) {
            return Err(ConfigValidationError::InvalidThreshold {
                field: "frequency_threshold_pct".to_string(),
                value: self.frequency_threshold_pct,
            });
        }

        self.cutoff_date()?;

        for (field, value) in [
            ("columns.sensitive_column", &self.columns.sensitive_column),
            ("columns.id_column", &self.columns.id_column),
            ("columns.partition_date_column", &self.columns.partition_date_column),
            ("ground_truth_column", &self.ground_truth_column),
            ("predicted_column", &self.predicted_column),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigValidationError::EmptyColumnName(field.to_string()));
            }
        }

        if let Some(groups) = &self.parity_reference_groups
            && groups.group_a == groups.group_b
        {
            return Err(ConfigValidationError::IdenticalReferenceGroups(
                groups.group_a.clone(),
            ));
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid threshold for '{field}': {value} (must be between 0 and 100)")]
    InvalidThreshold { field: String, value: f64 },

    #[error("Invalid outlier multiplier: {0} (must be a positive number)")]
    InvalidMultiplier(f64),

    #[error("Invalid partition cutoff date: '{0}'")]
    InvalidCutoffDate(String),

    #[error("Column name for '{0}' must not be empty")]
    EmptyColumnName(String),

    #[error("Parity reference groups must differ (both are '{0}')")]
    IdenticalReferenceGroups(String),
}

/// Builder for [`EquityConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct EquityConfigBuilder {
    outlier_multiplier: Option<f64>,
    remove_outliers: Option<bool>,
    frequency_threshold_pct: Option<f64>,
    partition_cutoff_date: Option<String>,
    strict_dates: Option<bool>,
    columns: Option<ColumnRoles>,
    sensitive_column: Option<String>,
    ground_truth_column: Option<String>,
    predicted_column: Option<String>,
    parity_reference_groups: Option<ReferenceGroups>,
}

impl EquityConfigBuilder {
    /// Set the IQR multiplier used for outlier bounds.
    pub fn outlier_multiplier(mut self, multiplier: f64) -> Self {
        self.outlier_multiplier = Some(multiplier);
        self
    }

    /// Enable or disable removal of flagged outliers.
    pub fn remove_outliers(mut self, remove: bool) -> Self {
        self.remove_outliers = Some(remove);
        self
    }

    /// Set the category frequency threshold.
    ///
    /// # Arguments
    /// * `threshold` - Percentage between 0 and 100 (e.g., 3.0 = 3%)
    pub fn frequency_threshold_pct(mut self, threshold: f64) -> Self {
        self.frequency_threshold_pct = Some(threshold);
        self
    }

    /// Set the policy-change date (e.g. "2028-03-01").
    pub fn partition_cutoff_date(mut self, date: impl Into<String>) -> Self {
        self.partition_cutoff_date = Some(date.into());
        self
    }

    /// Fail on unparseable dates instead of excluding them.
    pub fn strict_dates(mut self, strict: bool) -> Self {
        self.strict_dates = Some(strict);
        self
    }

    /// Replace the whole column-role mapping.
    pub fn columns(mut self, columns: ColumnRoles) -> Self {
        self.columns = Some(columns);
        self
    }

    /// Override only the sensitive column of the mapping.
    pub fn sensitive_column(mut self, column: impl Into<String>) -> Self {
        self.sensitive_column = Some(column.into());
        self
    }

    /// Set the ground-truth indicator column.
    pub fn ground_truth_column(mut self, column: impl Into<String>) -> Self {
        self.ground_truth_column = Some(column.into());
        self
    }

    /// Set the predicted indicator column.
    pub fn predicted_column(mut self, column: impl Into<String>) -> Self {
        self.predicted_column = Some(column.into());
        self
    }

    /// Set the groups compared by the demographic parity ratio.
    pub fn parity_reference_groups(mut self, groups: ReferenceGroups) -> Self {
        self.parity_reference_groups = Some(groups);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `EquityConfig` or an error if validation fails.
    pub fn build(self) -> Result<EquityConfig, ConfigValidationError> {
        let mut columns = self.columns.unwrap_or_default();
        if let Some(sensitive) = self.sensitive_column {
            columns.sensitive_column = sensitive;
        }

        let config = EquityConfig {
            outlier_multiplier: self
                .outlier_multiplier
                .unwrap_or(DEFAULT_OUTLIER_MULTIPLIER),
            remove_outliers: self.remove_outliers.unwrap_or(true),
            frequency_threshold_pct: self
                .frequency_threshold_pct
                .unwrap_or(DEFAULT_FREQUENCY_THRESHOLD_PCT),
            partition_cutoff_date: self
                .partition_cutoff_date
                .unwrap_or_else(|| DEFAULT_CUTOFF_DATE.to_string()),
            strict_dates: self.strict_dates.unwrap_or(false),
            columns,
            ground_truth_column: self
                .ground_truth_column
                .unwrap_or_else(|| TEST_POSITIVE_COLUMN.to_string()),
            predicted_column: self
                .predicted_column
                .unwrap_or_else(|| TEST_ORDERED_COLUMN.to_string()),
            parity_reference_groups: self.parity_reference_groups,
        };

        config.validate()?;
        Ok(config)
    }
}

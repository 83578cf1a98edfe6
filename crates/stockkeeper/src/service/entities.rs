use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Master style record. `style_code` is the natural key; uploads upsert on
/// it, SKUs reference it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Style {
    pub id: i64,
    pub style_code: String,
    pub brand: String,
    pub category: String,
    pub sub_category: String,
    pub mrp: Decimal,
    pub gender: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewStyle {
    pub style_code: String,
    pub brand: String,
    pub category: String,
    pub sub_category: String,
    pub mrp: Decimal,
    pub gender: String,
}

impl Style {
    /// Field-wise diff against an incoming row, used for audit details.
    /// Returns `None` when nothing would change.
    #[must_use]
    pub fn diff(&self, incoming: &NewStyle) -> Option<String> {
        let mut changes = Vec::new();
        if self.brand != incoming.brand {
            changes.push(format!("brand: {} -> {}", self.brand, incoming.brand));
        }
        if self.category != incoming.category {
            changes.push(format!(
                "category: {} -> {}",
                self.category, incoming.category
            ));
        }
        if self.sub_category != incoming.sub_category {
            changes.push(format!(
                "subCategory: {} -> {}",
                self.sub_category, incoming.sub_category
            ));
        }
        if self.mrp != incoming.mrp {
            changes.push(format!("mrp: {} -> {}", self.mrp, incoming.mrp));
        }
        if self.gender != incoming.gender {
            changes.push(format!("gender: {} -> {}", self.gender, incoming.gender));
        }
        if changes.is_empty() {
            None
        } else {
            Some(changes.join(", "))
        }
    }
}

/// Master SKU record. `sku` is the natural key; sales reference it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub id: i64,
    pub sku: String,
    pub style_id: i64,
    pub size: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewSku {
    pub sku: String,
    pub style_id: i64,
    pub size: String,
}

impl Sku {
    #[must_use]
    pub fn diff(&self, incoming: &NewSku) -> Option<String> {
        let mut changes = Vec::new();
        if self.style_id != incoming.style_id {
            changes.push(format!("styleId: {} -> {}", self.style_id, incoming.style_id));
        }
        if self.size != incoming.size {
            changes.push(format!("size: {} -> {}", self.size, incoming.size));
        }
        if changes.is_empty() {
            None
        } else {
            Some(changes.join(", "))
        }
    }
}

/// Master store record. `branch` is the natural key; sales reference it via
/// their `channel` column.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Store {
    pub id: i64,
    pub branch: String,
    pub city: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewStore {
    pub branch: String,
    pub city: String,
}

impl Store {
    #[must_use]
    pub fn diff(&self, incoming: &NewStore) -> Option<String> {
        if self.city == incoming.city {
            None
        } else {
            Some(format!("city: {} -> {}", self.city, incoming.city))
        }
    }
}

/// One sales transaction line. Sales uploads replace the whole table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaleRecord {
    pub id: i64,
    pub day: NaiveDate,
    pub sku_id: i64,
    pub store_id: i64,
    pub quantity: i64,
    pub discount: Decimal,
    pub revenue: Decimal,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewSaleRecord {
    pub day: NaiveDate,
    pub sku_id: i64,
    pub store_id: i64,
    pub quantity: i64,
    pub discount: Decimal,
    pub revenue: Decimal,
}

/// NOOS classification buckets.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NoosType {
    Core,
    Bestseller,
    Fashion,
}

/// One classified style as produced by an algorithm run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoosResult {
    pub id: i64,
    /// Task id of the run that produced this row.
    pub algorithm_run_id: i64,
    pub category: String,
    pub style_code: String,
    pub style_ros: Decimal,
    pub r#type: NoosType,
    /// Percent share of the style's category revenue.
    pub style_rev_contribution: Decimal,
    pub total_quantity_sold: i64,
    pub total_revenue: Decimal,
    pub days_available: i64,
    pub days_with_sales: i64,
    pub avg_discount: Decimal,
    pub calculated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewNoosResult {
    pub algorithm_run_id: i64,
    pub category: String,
    pub style_code: String,
    pub style_ros: Decimal,
    pub r#type: NoosType,
    pub style_rev_contribution: Decimal,
    pub total_quantity_sold: i64,
    pub total_revenue: Decimal,
    pub days_available: i64,
    pub days_with_sales: i64,
    pub avg_discount: Decimal,
    pub calculated_at: DateTime<Utc>,
}

#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Insert,
    Update,
    BulkDelete,
    BulkInsert,
    ClearAll,
}

/// Append-only audit record for entity mutations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub id: i64,
    pub logged_at: DateTime<Utc>,
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    pub details: String,
    pub modified_by: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewAuditEntry {
    pub entity_type: String,
    pub entity_id: String,
    pub action: AuditAction,
    pub details: String,
    pub modified_by: String,
}

impl NewAuditEntry {
    #[must_use]
    pub fn system(
        entity_type: &str,
        entity_id: impl Into<String>,
        action: AuditAction,
        details: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.to_string(),
            entity_id: entity_id.into(),
            action,
            details: details.into(),
            modified_by: "system".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::*;

    #[test]
    fn test_style_diff_reports_changed_fields_only() {
        let existing = Style {
            id: 1,
            style_code: "STY1".into(),
            brand: "acme".into(),
            category: "shirts".into(),
            sub_category: "casual".into(),
            mrp: Decimal::new(99_900, 2),
            gender: "men".into(),
        };
        let incoming = NewStyle {
            style_code: "STY1".into(),
            brand: "acme".into(),
            category: "shirts".into(),
            sub_category: "formal".into(),
            mrp: Decimal::new(99_900, 2),
            gender: "men".into(),
        };
        assert_eq!(
            existing.diff(&incoming).as_deref(),
            Some("subCategory: casual -> formal")
        );
    }

    #[test]
    fn test_style_diff_is_none_for_identical_rows() {
        let existing = Style {
            id: 1,
            style_code: "STY1".into(),
            brand: "acme".into(),
            category: "shirts".into(),
            sub_category: "casual".into(),
            mrp: Decimal::new(99_900, 2),
            gender: "men".into(),
        };
        let incoming = NewStyle {
            style_code: existing.style_code.clone(),
            brand: existing.brand.clone(),
            category: existing.category.clone(),
            sub_category: existing.sub_category.clone(),
            mrp: existing.mrp,
            gender: existing.gender.clone(),
        };
        assert_eq!(existing.diff(&incoming), None);
    }
}

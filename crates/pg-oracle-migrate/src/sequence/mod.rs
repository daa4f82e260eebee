//! Sequence synthesis and replication.
//!
//! Synthesized sequences start one past the current maximum identifier of
//! their owning table. Replicated sequences (Oracle sources) keep their
//! bounds and resume at the source's `last_number`. Existing sequences are
//! never altered.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::identifier::{oracle_name, validate_identifier};
use crate::core::schema::SequenceDef;
use crate::core::traits::{SourceReader, TargetWriter};
use crate::error::Result;
use crate::report::{PhaseSummary, UnitOutcome};

/// A sequence to create and the table whose identifier it feeds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceSpec {
    pub name: String,
    pub table: String,
}

impl SequenceSpec {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
        }
    }
}

/// Sequences created for the MES transactional tables.
pub const DEFAULT_SEQUENCES: &[(&str, &str)] = &[
    ("SEQ_STOCK_TRANSACTIONS", "STOCK_TRANSACTIONS"),
    ("SEQ_PRODUCT_TRANSACTIONS", "PRODUCT_TRANSACTIONS"),
    ("SEQ_MAT_ARRIVALS", "MAT_ARRIVALS"),
    ("SEQ_MAT_RECEIVINGS", "MAT_RECEIVINGS"),
    ("SEQ_MAT_ISSUES", "MAT_ISSUES"),
    ("SEQ_MAT_ISSUE_REQUESTS", "MAT_ISSUE_REQUESTS"),
    ("SEQ_MAT_ISSUE_REQ_ITEMS", "MAT_ISSUE_REQUEST_ITEMS"),
    ("SEQ_PROD_RESULTS", "PROD_RESULTS"),
    ("SEQ_IQC_LOGS", "IQC_LOGS"),
    ("SEQ_IQC_GROUPS", "IQC_GROUPS"),
    ("SEQ_IQC_GROUP_ITEMS", "IQC_GROUP_ITEMS"),
    ("SEQ_IQC_ITEM_POOL", "IQC_ITEM_POOL"),
    ("SEQ_IQC_ITEM_MASTERS", "IQC_ITEM_MASTERS"),
    ("SEQ_IQC_PART_LINKS", "IQC_PART_LINKS"),
    ("SEQ_INSPECT_RESULTS", "INSPECT_RESULTS"),
    ("SEQ_DEFECT_LOGS", "DEFECT_LOGS"),
    ("SEQ_INV_ADJ_LOGS", "INV_ADJ_LOGS"),
    ("SEQ_EQUIP_INSPECT_LOGS", "EQUIP_INSPECT_LOGS"),
    ("SEQ_EQUIP_INSPECT_ITEMS", "EQUIP_INSPECT_ITEM_MASTERS"),
    ("SEQ_EQUIP_BOM_RELS", "EQUIP_BOM_RELS"),
    ("SEQ_PM_WORK_ORDERS", "PM_WORK_ORDERS"),
    ("SEQ_PM_PLAN_ITEMS", "PM_PLAN_ITEMS"),
    ("SEQ_PM_WO_RESULTS", "PM_WO_RESULTS"),
    ("SEQ_SHIPMENT_LOGS", "SHIPMENT_LOGS"),
    ("SEQ_SHIPMENT_RETURNS", "SHIPMENT_RETURNS"),
    ("SEQ_SHIPMENT_RETURN_ITEMS", "SHIPMENT_RETURN_ITEMS"),
    ("SEQ_SHIPMENT_ORDER_ITEMS", "SHIPMENT_ORDER_ITEMS"),
    ("SEQ_CUSTOMER_ORDER_ITEMS", "CUSTOMER_ORDER_ITEMS"),
    ("SEQ_PURCHASE_ORDER_ITEMS", "PURCHASE_ORDER_ITEMS"),
    ("SEQ_OQC_REQUEST_BOXES", "OQC_REQUEST_BOXES"),
    ("SEQ_CONSUMABLE_LOGS", "CONSUMABLE_LOGS"),
    ("SEQ_CONSUMABLE_MOUNT_LOGS", "CONSUMABLE_MOUNT_LOGS"),
    ("SEQ_REPAIR_LOGS", "REPAIR_LOGS"),
    ("SEQ_TRACE_LOGS", "TRACE_LOGS"),
    ("SEQ_INTER_LOGS", "INTER_LOGS"),
    ("SEQ_CUSTOMS_ENTRIES", "CUSTOMS_ENTRIES"),
    ("SEQ_CUSTOMS_LOTS", "CUSTOMS_LOTS"),
    ("SEQ_CUSTOMS_USAGE_RPTS", "CUSTOMS_USAGE_REPORTS"),
    ("SEQ_SUBCON_DELIVERIES", "SUBCON_DELIVERIES"),
    ("SEQ_SUBCON_RECEIVES", "SUBCON_RECEIVES"),
    ("SEQ_MODEL_SUFFIXES", "MODEL_SUFFIXES"),
    ("SEQ_PROCESS_MAPS", "PROCESS_MAPS"),
    ("SEQ_LABEL_TEMPLATES", "LABEL_TEMPLATES"),
    ("SEQ_LABEL_PRINT_LOGS", "LABEL_PRINT_LOGS"),
    ("SEQ_WORK_INSTRUCTIONS", "WORK_INSTRUCTIONS"),
    ("SEQ_VENDOR_BARCODE_MAP", "VENDOR_BARCODE_MAPPINGS"),
    ("SEQ_WH_TRANSFER_RULES", "WAREHOUSE_TRANSFER_RULES"),
    ("SEQ_ROLE_MENU_PERMS", "ROLE_MENU_PERMISSIONS"),
    ("SEQ_USER_AUTHS", "USER_AUTHS"),
    ("SEQ_ACTIVITY_LOGS", "ACTIVITY_LOGS"),
    ("SEQ_SAMPLE_INSPECT_RESULTS", "SAMPLE_INSPECT_RESULTS"),
];

pub fn default_sequences() -> Vec<SequenceSpec> {
    DEFAULT_SEQUENCES
        .iter()
        .map(|(name, table)| SequenceSpec::new(*name, *table))
        .collect()
}

/// First value for a sequence over `table.id_column`.
///
/// `MAX(id) + 1`, where a missing, non-numeric or negative maximum counts
/// as 0. If the column cannot be read at all the start is 1.
pub async fn start_value(target: &dyn TargetWriter, table: &str, id_column: &str) -> i64 {
    let max = match target.max_value(table, id_column).await {
        Ok(Some(value)) => value.as_i64().filter(|v| *v > 0).unwrap_or(0),
        Ok(None) => 0,
        Err(e) => {
            warn!("{}: cannot read MAX({}): {}", table, id_column, e.summary());
            0
        }
    };
    max.saturating_add(1)
}

async fn create_sequence(target: &dyn TargetWriter, def: &SequenceDef) -> UnitOutcome {
    match target.execute(&def.create_sql()).await {
        Ok(()) => {
            info!("Created sequence {} (start={})", def.name, def.start);
            UnitOutcome::Success
        }
        Err(e) if e.is_already_exists() => UnitOutcome::skipped("already exists"),
        Err(e) => {
            warn!("Sequence {} failed: {}", def.name, e.summary());
            UnitOutcome::failed(e.summary())
        }
    }
}

async fn existing_sequences(target: &dyn TargetWriter) -> Result<HashSet<String>> {
    Ok(target
        .sequence_names()
        .await?
        .into_iter()
        .map(|n| n.to_uppercase())
        .collect())
}

/// Create each declared sequence that does not exist yet.
pub async fn synthesize(
    target: &dyn TargetWriter,
    specs: &[SequenceSpec],
    id_column: &str,
) -> Result<PhaseSummary> {
    let existing = existing_sequences(target).await?;
    let mut summary = PhaseSummary::new("sequences");

    for spec in specs {
        let outcome = if existing.contains(&spec.name.to_uppercase()) {
            info!("Sequence {} already exists", spec.name);
            UnitOutcome::skipped("already exists")
        } else {
            match (oracle_name(&spec.name), oracle_name(&spec.table)) {
                (Ok(name), Ok(table)) => {
                    let start = start_value(target, &table, id_column).await;
                    create_sequence(target, &SequenceDef::synthesized(name, table, start)).await
                }
                (Err(e), _) | (_, Err(e)) => UnitOutcome::failed(e.summary()),
            }
        };
        summary.record(&spec.name, outcome);
    }

    info!(
        "Sequences: {} created, {} skipped, {} errors",
        summary.succeeded, summary.skipped, summary.failed
    );
    Ok(summary)
}

/// Copy the source schema's sequences to the target.
pub async fn replicate(
    source: &dyn SourceReader,
    target: &dyn TargetWriter,
    source_schema: &str,
) -> Result<PhaseSummary> {
    let defs = source.list_sequences(source_schema).await?;
    let existing = existing_sequences(target).await?;
    let mut summary = PhaseSummary::new("sequences");

    for def in defs {
        let outcome = if existing.contains(&def.name.to_uppercase()) {
            UnitOutcome::skipped("already exists")
        } else if let Err(e) = validate_identifier(&def.name) {
            UnitOutcome::failed(e.summary())
        } else {
            create_sequence(target, &def).await
        };
        summary.record(&def.name, outcome);
    }

    Ok(summary)
}

//! Copy order for tables.
//!
//! Every table referenced by a foreign key must be loaded before the table
//! that references it. Two strategies are offered: the maintained explicit
//! list, and a topological sort of the live foreign-key catalog that falls
//! back to the explicit list for ties and cycles.

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;
use tracing::{debug, warn};

use crate::core::schema::Table;

/// The maintained MES copy order: masters, BOM, users, warehouse/LOT,
/// purchasing and subcontracting, production, material, shipping, trace,
/// bonded goods and inspection.
pub const DEFAULT_TABLE_ORDER: &[&str] = &[
    // master data
    "com_codes",
    "company_masters",
    "department_masters",
    "partner_masters",
    "num_rule_masters",
    "plants",
    "prod_line_masters",
    "process_masters",
    "vendor_masters",
    "worker_masters",
    "part_masters",
    "equip_masters",
    "consumable_masters",
    "label_templates",
    "comm_configs",
    // BOM
    "bom_masters",
    "process_maps",
    "work_instructions",
    "iqc_item_masters",
    "equip_inspect_item_masters",
    // users
    "users",
    "user_auths",
    // warehouse / LOT
    "warehouses",
    "lots",
    "mat_lots",
    "stocks",
    "mat_stocks",
    // purchasing / subcontract
    "purchase_orders",
    "purchase_order_items",
    "subcon_orders",
    "subcon_deliveries",
    "subcon_receives",
    // production
    "job_orders",
    "prod_results",
    "inspect_results",
    "defect_logs",
    "repair_logs",
    // material
    "stock_transactions",
    "mat_issues",
    "consumable_logs",
    "inv_adj_logs",
    // shipping
    "box_masters",
    "pallet_masters",
    "shipment_logs",
    "shipment_orders",
    "shipment_order_items",
    "shipment_returns",
    "shipment_return_items",
    "customer_orders",
    "customer_order_items",
    // trace
    "trace_logs",
    "inter_logs",
    // bonded
    "customs_entries",
    "customs_lots",
    "customs_usage_reports",
    // inspection
    "equip_inspect_logs",
    "warehouse_transfer_rules",
];

/// The default order as owned strings.
pub fn default_table_order() -> Vec<String> {
    DEFAULT_TABLE_ORDER.iter().map(|s| s.to_string()).collect()
}

/// A resolved copy order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableOrder {
    /// Tables in copy order, named as the source reports them.
    pub tables: Vec<String>,

    /// Source tables left out because the explicit order does not list them.
    pub skipped: Vec<String>,

    /// Explicit entries with no matching source table.
    pub missing: Vec<String>,

    /// Tables whose position came from the manual order because they sit
    /// on a foreign-key cycle.
    pub cyclic: Vec<String>,
}

impl TableOrder {
    /// Follow the explicit list, keeping only tables the source has.
    pub fn explicit(order: &[String], available: &[String]) -> Self {
        let by_key: HashMap<String, &String> =
            available.iter().map(|n| (n.to_lowercase(), n)).collect();

        let mut result = Self::default();
        let mut seen = BTreeSet::new();
        for name in order {
            let key = name.to_lowercase();
            if !seen.insert(key.clone()) {
                continue;
            }
            match by_key.get(&key) {
                Some(actual) => result.tables.push((*actual).clone()),
                None => {
                    warn!("Table {} is listed in the copy order but not in the source", name);
                    result.missing.push(name.clone());
                }
            }
        }

        for name in available {
            if !seen.contains(&name.to_lowercase()) {
                warn!("Table {} is not in the copy order, skipping", name);
                result.skipped.push(name.clone());
            }
        }

        result
    }

    /// Order tables topologically by their foreign keys.
    ///
    /// Ready tables are taken by explicit-order rank, then by name. When only
    /// cycles remain, the lowest-ranked cycle with no outside parent is
    /// placed in explicit-order rank and the sort resumes, so tables that
    /// merely hang off a cycle still follow their parents. Every input table
    /// appears exactly once.
    pub fn resolve_with_foreign_keys(tables: &[Table], explicit: &[String]) -> Self {
        let rank_of: HashMap<String, usize> = explicit
            .iter()
            .enumerate()
            .map(|(i, n)| (n.to_lowercase(), i))
            .collect();
        let rank = |name: &str| rank_of.get(&name.to_lowercase()).copied().unwrap_or(usize::MAX);
        let key = |i: usize| (rank(&tables[i].name), tables[i].name.to_lowercase(), i);

        let index: HashMap<String, usize> = tables
            .iter()
            .enumerate()
            .map(|(i, t)| (t.name.to_lowercase(), i))
            .collect();

        let mut indegree = vec![0usize; tables.len()];
        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); tables.len()];
        for (i, table) in tables.iter().enumerate() {
            let mut refs = BTreeSet::new();
            for parent in table.referenced_tables() {
                match index.get(&parent.to_lowercase()) {
                    Some(&p) => {
                        refs.insert(p);
                    }
                    None => debug!(
                        "{} references {} which is not being copied",
                        table.name, parent
                    ),
                }
            }
            for p in refs {
                indegree[i] += 1;
                parents[i].push(p);
                dependents[p].push(i);
            }
        }

        let mut ready: BTreeSet<(usize, String, usize)> =
            (0..tables.len()).filter(|&i| indegree[i] == 0).map(key).collect();

        let mut result = Self::default();
        let mut placed = vec![false; tables.len()];
        loop {
            while let Some((_, _, i)) = ready.pop_first() {
                placed[i] = true;
                result.tables.push(tables[i].name.clone());
                for &d in &dependents[i] {
                    indegree[d] -= 1;
                    if indegree[d] == 0 && !placed[d] {
                        ready.insert(key(d));
                    }
                }
            }

            let mut remaining: Vec<_> = (0..tables.len()).filter(|&i| !placed[i]).map(key).collect();
            if remaining.is_empty() {
                break;
            }
            remaining.sort();

            // A cycle nothing outside it points into; one always exists.
            let Some(cycle) = remaining
                .iter()
                .map(|&(_, _, i)| component(i, &parents, &dependents, &placed))
                .find(|c| c.iter().all(|&m| parents[m].iter().all(|p| placed[*p] || c.contains(p))))
            else {
                break;
            };

            let mut members: Vec<_> = cycle.into_iter().map(key).collect();
            members.sort();
            let names: Vec<&str> = members.iter().map(|m| tables[m.2].name.as_str()).collect();
            warn!(
                "Foreign-key cycle among {}; using the manual order for these tables",
                names.join(", ")
            );
            for &(_, _, i) in &members {
                placed[i] = true;
                result.tables.push(tables[i].name.clone());
                result.cyclic.push(tables[i].name.clone());
            }
            for &(_, _, i) in &members {
                for &d in &dependents[i] {
                    indegree[d] -= 1;
                    if indegree[d] == 0 && !placed[d] {
                        ready.insert(key(d));
                    }
                }
            }
        }

        result
    }

    /// Position of a table in the order.
    pub fn rank_of(&self, name: &str) -> Option<usize> {
        self.tables.iter().position(|t| t.eq_ignore_ascii_case(name))
    }

    /// Write each table's position into its `rank` field.
    pub fn apply_ranks(&self, tables: &mut [Table]) {
        for table in tables.iter_mut() {
            if let Some(rank) = self.rank_of(&table.name) {
                table.rank = rank;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// The strongly connected component of `start` among unplaced tables:
/// everything it reaches through dependents that also reaches it back.
fn component(
    start: usize,
    parents: &[Vec<usize>],
    dependents: &[Vec<usize>],
    placed: &[bool],
) -> BTreeSet<usize> {
    let reach = |edges: &[Vec<usize>]| {
        let mut seen = BTreeSet::from([start]);
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            for &next in &edges[n] {
                if !placed[next] && seen.insert(next) {
                    stack.push(next);
                }
            }
        }
        seen
    };
    let forward = reach(dependents);
    let backward = reach(parents);
    forward.intersection(&backward).copied().collect()
}

/// A table placed before a table it references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderViolation {
    /// The referencing table.
    pub table: String,
    /// The referenced table that comes later.
    pub references: String,
    pub table_pos: usize,
    pub references_pos: usize,
}

impl std::fmt::Display for OrderViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (#{}) references {} (#{})",
            self.table,
            self.table_pos + 1,
            self.references,
            self.references_pos + 1
        )
    }
}

/// Every place where `order` loads a table before one it references.
///
/// References to tables outside the order and self references are ignored.
pub fn check_order(order: &[String], tables: &[Table]) -> Vec<OrderViolation> {
    let pos: HashMap<String, usize> = order
        .iter()
        .enumerate()
        .map(|(i, n)| (n.to_lowercase(), i))
        .collect();

    let mut violations = Vec::new();
    for table in tables {
        let Some(&table_pos) = pos.get(&table.name.to_lowercase()) else {
            continue;
        };
        for parent in table.referenced_tables() {
            if let Some(&parent_pos) = pos.get(&parent.to_lowercase()) {
                if parent_pos > table_pos {
                    violations.push(OrderViolation {
                        table: table.name.clone(),
                        references: parent.to_string(),
                        table_pos,
                        references_pos: parent_pos,
                    });
                }
            }
        }
    }
    violations.sort_by_key(|v| (v.table_pos, v.references_pos));
    violations
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::ForeignKey;

    fn table(name: &str, refs: &[&str]) -> Table {
        let mut t = Table::new("public", name);
        for r in refs {
            t.foreign_keys.push(ForeignKey {
                name: format!("fk_{}_{}", name, r),
                columns: vec![format!("{}_id", r)],
                ref_table: r.to_string(),
                ref_columns: vec!["id".into()],
            });
        }
        t
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_order_has_57_unique_tables() {
        assert_eq!(DEFAULT_TABLE_ORDER.len(), 57);
        let unique: BTreeSet<_> = DEFAULT_TABLE_ORDER.iter().collect();
        assert_eq!(unique.len(), 57);
    }

    #[test]
    fn test_explicit_skips_and_reports() {
        let order = names(&["plants", "users", "lots"]);
        let available = names(&["LOTS", "PLANTS", "AUDIT_TRAIL"]);
        let resolved = TableOrder::explicit(&order, &available);
        assert_eq!(resolved.tables, names(&["PLANTS", "LOTS"]));
        assert_eq!(resolved.missing, names(&["users"]));
        assert_eq!(resolved.skipped, names(&["AUDIT_TRAIL"]));
    }

    #[test]
    fn test_fk_order_respects_references() {
        let tables = vec![
            table("purchase_order_items", &["purchase_orders", "part_masters"]),
            table("purchase_orders", &["vendor_masters"]),
            table("part_masters", &[]),
            table("vendor_masters", &[]),
        ];
        let resolved = TableOrder::resolve_with_foreign_keys(&tables, &default_table_order());
        assert!(check_order(&resolved.tables, &tables).is_empty());
        assert_eq!(resolved.len(), 4);
        // ties broken by explicit rank: vendor_masters precedes part_masters there
        assert_eq!(resolved.tables[0], "vendor_masters");
        assert_eq!(resolved.tables[3], "purchase_order_items");
    }

    #[test]
    fn test_fk_order_name_tiebreak_for_unranked() {
        let tables = vec![table("zeta", &[]), table("alpha", &[])];
        let resolved = TableOrder::resolve_with_foreign_keys(&tables, &[]);
        assert_eq!(resolved.tables, names(&["alpha", "zeta"]));
    }

    #[test]
    fn test_self_reference_ignored() {
        let tables = vec![table("department_masters", &["department_masters"])];
        let resolved = TableOrder::resolve_with_foreign_keys(&tables, &[]);
        assert_eq!(resolved.tables, names(&["department_masters"]));
        assert!(resolved.cyclic.is_empty());
    }

    #[test]
    fn test_cycle_falls_back_to_explicit_rank() {
        let tables = vec![
            table("shipment_orders", &["box_masters"]),
            table("box_masters", &["shipment_orders"]),
            table("plants", &[]),
        ];
        let resolved = TableOrder::resolve_with_foreign_keys(&tables, &default_table_order());
        assert_eq!(
            resolved.tables,
            names(&["plants", "box_masters", "shipment_orders"])
        );
        assert_eq!(resolved.cyclic, names(&["box_masters", "shipment_orders"]));
    }

    #[test]
    fn test_tables_hanging_off_a_cycle_follow_their_parents() {
        // "aaa_lines" is not on the cycle; it only references a cycle member
        // and an ordinary parent that ranks last.
        let tables = vec![
            table("aaa_lines", &["box_masters", "zz_parent"]),
            table("shipment_orders", &["box_masters"]),
            table("box_masters", &["shipment_orders"]),
            table("zz_parent", &[]),
        ];
        let explicit = names(&["aaa_lines", "box_masters", "shipment_orders", "zz_parent"]);
        let resolved = TableOrder::resolve_with_foreign_keys(&tables, &explicit);

        assert_eq!(
            resolved.tables,
            names(&["zz_parent", "box_masters", "shipment_orders", "aaa_lines"])
        );
        assert_eq!(resolved.cyclic, names(&["box_masters", "shipment_orders"]));
        let violations = check_order(&resolved.tables, &tables);
        assert!(violations.iter().all(|v| resolved.cyclic.contains(&v.table)));
    }

    #[test]
    fn test_check_order_reports_violation() {
        let tables = vec![table("lots", &["part_masters"]), table("part_masters", &[])];
        let violations = check_order(&names(&["lots", "part_masters"]), &tables);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].table, "lots");
        assert_eq!(violations[0].references, "part_masters");
        assert_eq!(violations[0].to_string(), "lots (#1) references part_masters (#2)");
    }

    #[test]
    fn test_apply_ranks() {
        let mut tables = vec![table("lots", &["plants"]), table("plants", &[])];
        let resolved = TableOrder::resolve_with_foreign_keys(&tables, &[]);
        resolved.apply_ranks(&mut tables);
        assert_eq!(tables[0].rank, 1);
        assert_eq!(tables[1].rank, 0);
    }
}

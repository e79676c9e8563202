//! Reconciliation driver: push the catalogue out, pull flagged edits back.
//!
//! Both directions start by discovering the remote tables and binding their
//! fields to canonical names. A push regenerates every flat record and
//! upserts it by natural key. A pull reads only rows whose sync checkbox is
//! ticked, reconstructs patches and merges them into the catalogue; clearing
//! the checkbox afterwards is a separate step so it can run once the
//! catalogue is safely on disk.
use crate::catalog::{apply_patches, ApplyOutcome, Catalog, PatchSet};
use crate::diagnostics::Diagnostics;
use crate::flat::{codec, field, normalize_name, resolve_table_alias, FieldType, FlatRecord};
use crate::flat::{Table, TableSet};
use crate::flatten::flatten_catalog;
use crate::reconstruct::reconstruct;
use crate::store::{RecordStore, RowFilter, TableBinding};
use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOptions {
    /// Restrict the run to these canonical tables; `None` means all.
    pub tables: Option<BTreeSet<Table>>,
    /// Name of the checkbox gating which rows a pull reads.
    pub sync_field: String,
    pub acknowledge: bool,
    /// Compute patches without touching the catalogue or the remote side.
    pub dry_run: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            tables: None,
            sync_field: field::SYNC.to_string(),
            acknowledge: false,
            dry_run: false,
        }
    }
}

impl SyncOptions {
    pub fn includes(&self, table: Table) -> bool {
        self.tables
            .as_ref()
            .is_none_or(|tables| tables.contains(&table))
    }

    fn gate_field(&self) -> String {
        normalize_name(&self.sync_field)
    }
}

#[derive(Debug, Default)]
pub struct PushReport {
    pub tables: usize,
    pub created: usize,
    pub updated: usize,
    pub fields_created: usize,
    pub diagnostics: Diagnostics,
}

/// A row read by a pull, identified for acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlaggedRow {
    pub table: Table,
    pub row_id: String,
    /// Remote name of the gate checkbox.
    pub field: String,
}

#[derive(Debug, Default)]
pub struct PullReport {
    pub rows: usize,
    pub patches: PatchSet,
    pub outcome: ApplyOutcome,
    pub flagged: Vec<FlaggedRow>,
    pub diagnostics: Diagnostics,
}

/// Bind every remote table whose title resolves to a wanted canonical table.
pub fn discover<F>(
    store: &mut dyn RecordStore,
    wanted: F,
    diagnostics: &mut Diagnostics,
) -> Result<BTreeMap<Table, TableBinding>>
where
    F: Fn(Table) -> bool,
{
    let mut bindings = BTreeMap::new();
    for remote in store.list_tables()? {
        let Some(table) = resolve_table_alias(&remote.title) else {
            tracing::debug!(title = remote.title.as_str(), "ignoring unrecognized remote table");
            continue;
        };
        if !wanted(table) {
            continue;
        }
        if bindings.contains_key(&table) {
            diagnostics.warn(
                table.name(),
                None,
                format!("more than one remote table maps here; {:?} ignored", remote.title),
            );
            continue;
        }
        let schema = store.get_schema(&remote.id)?;
        tracing::debug!(
            table = table.name(),
            title = remote.title.as_str(),
            fields = schema.len(),
            "bound remote table"
        );
        bindings.insert(table, TableBinding::new(table, &remote, &schema));
    }
    Ok(bindings)
}

struct PushContext<'a> {
    options: &'a SyncOptions,
    /// Campaign table id and remote key field, for section relations.
    campaign_table: Option<(String, String)>,
    /// Campaign id -> remote row id.
    campaign_rows: BTreeMap<String, String>,
    report: PushReport,
}

pub fn push(
    store: &mut dyn RecordStore,
    catalog: &Catalog,
    options: &SyncOptions,
) -> Result<PushReport> {
    let start = Instant::now();
    let mut diagnostics = Diagnostics::new();
    catalog.check_keys(&mut diagnostics);
    let tables = flatten_catalog(catalog);
    let mut bindings = discover(store, |table| options.includes(table), &mut diagnostics)?;

    let campaign_table = bindings.get(&Table::Campaigns).and_then(|binding| {
        let key = binding.remote_name(field::CAMPAIGN_ID)?;
        Some((binding.table_id.clone(), key.to_string()))
    });
    let mut ctx = PushContext {
        options,
        campaign_table,
        campaign_rows: BTreeMap::new(),
        report: PushReport {
            diagnostics,
            ..PushReport::default()
        },
    };

    for table in Table::ALL {
        if !options.includes(table) {
            continue;
        }
        let records = tables.get(&table).map(Vec::as_slice).unwrap_or(&[]);
        let Some(binding) = bindings.get_mut(&table) else {
            if records.is_empty() {
                tracing::debug!(table = table.name(), "no remote table and nothing to push");
            } else {
                ctx.report.diagnostics.warn(
                    table.name(),
                    None,
                    "table not found on the remote side; skipped",
                );
            }
            continue;
        };
        push_table(store, binding, records, &mut ctx)?;
        ctx.report.tables += 1;
    }

    let report = ctx.report;
    tracing::info!(
        tables = report.tables,
        created = report.created,
        updated = report.updated,
        elapsed_ms = start.elapsed().as_millis(),
        "push complete"
    );
    Ok(report)
}

fn push_table(
    store: &mut dyn RecordStore,
    binding: &mut TableBinding,
    records: &[FlatRecord],
    ctx: &mut PushContext<'_>,
) -> Result<()> {
    let table = binding.table;
    ensure_table_fields(store, binding, records, ctx)?;

    let Some(key_field) = binding.remote_name(table.key_field()).map(str::to_string) else {
        ctx.report
            .diagnostics
            .warn(table.name(), None, "remote table has no title field; skipped");
        return Ok(());
    };

    let mut dropped = BTreeSet::new();
    for record in records {
        let key = codec::text(record, table.key_field());
        if key.is_empty() {
            continue;
        }
        let mut record = record.clone();
        if table == Table::CampaignSections {
            let campaign = codec::text(&record, field::CAMPAIGN_ID);
            if let Some(row_id) = campaign_row_id(store, ctx, &campaign)? {
                record.put_relation(field::CAMPAIGN, &[row_id]);
            }
        }
        let (remote, unbound) = binding.to_remote(&record);
        dropped.extend(unbound);

        let row_id = match store.find_by_key(&binding.table_id, &key_field, &key)? {
            Some(row_id) => {
                let mut remote = remote;
                for (name, blank) in binding.blanks_for(&record).iter() {
                    remote.insert(name, blank.clone());
                }
                store.update_row(&row_id, &remote)?;
                ctx.report.updated += 1;
                row_id
            }
            None => {
                let row_id = store.create_row(&binding.table_id, &remote)?;
                ctx.report.created += 1;
                row_id
            }
        };
        if table == Table::Campaigns {
            ctx.campaign_rows.insert(key, row_id);
        }
    }

    if !dropped.is_empty() {
        let names: Vec<String> = dropped.into_iter().collect();
        ctx.report.diagnostics.info(
            table.name(),
            None,
            format!("not pushed (no matching remote field): {}", names.join(", ")),
        );
    }
    tracing::info!(table = table.name(), rows = records.len(), "pushed table");
    Ok(())
}

/// Create the scalar fields the records need and the remote table lacks.
fn ensure_table_fields(
    store: &mut dyn RecordStore,
    binding: &mut TableBinding,
    records: &[FlatRecord],
    ctx: &mut PushContext<'_>,
) -> Result<()> {
    let table = binding.table;
    let mut wanted: BTreeMap<String, FieldType> = BTreeMap::new();
    for record in records {
        for (name, value) in record.iter() {
            wanted
                .entry(name.clone())
                .or_insert_with(|| value.field_type());
        }
    }
    if table.is_pullable() {
        wanted
            .entry(ctx.options.gate_field())
            .or_insert(FieldType::Checkbox);
    }
    if table == Table::CampaignSections {
        wanted
            .entry(field::CAMPAIGN.to_string())
            .or_insert(FieldType::Relation);
    }
    let missing: Vec<(String, FieldType)> = wanted
        .into_iter()
        .filter(|(name, _)| !binding.has_field(name))
        .map(|(name, ty)| (name, creatable_type(ty)))
        .collect();
    if missing.is_empty() {
        return Ok(());
    }

    let ensured = store.ensure_fields(&binding.table_id, &missing)?;
    for (name, ty) in &missing {
        if ensured.created.contains(name) {
            binding.bind_created(name, *ty);
        }
    }
    ctx.report.fields_created += ensured.created.len();
    if !ensured.created.is_empty() {
        tracing::info!(
            table = table.name(),
            created = ?ensured.created,
            "created remote fields"
        );
    }
    if !ensured.skipped.is_empty() {
        ctx.report.diagnostics.info(
            table.name(),
            None,
            format!(
                "fields must be created by hand: {}",
                ensured.skipped.join(", ")
            ),
        );
    }
    Ok(())
}

/// Dates and URLs travel as text when the field has to be created.
fn creatable_type(ty: FieldType) -> FieldType {
    match ty {
        FieldType::Date | FieldType::Url => FieldType::Text,
        other => other,
    }
}

fn campaign_row_id(
    store: &mut dyn RecordStore,
    ctx: &mut PushContext<'_>,
    campaign: &str,
) -> Result<Option<String>> {
    if campaign.is_empty() {
        return Ok(None);
    }
    if let Some(row_id) = ctx.campaign_rows.get(campaign) {
        return Ok(Some(row_id.clone()));
    }
    let Some((table_id, key_field)) = &ctx.campaign_table else {
        return Ok(None);
    };
    let found = store.find_by_key(table_id, key_field, campaign)?;
    if let Some(row_id) = &found {
        ctx.campaign_rows
            .insert(campaign.to_string(), row_id.clone());
    }
    Ok(found)
}

/// Read flagged rows, reconstruct patches and (unless dry-run) apply them.
pub fn pull(
    store: &mut dyn RecordStore,
    catalog: &mut Catalog,
    options: &SyncOptions,
) -> Result<PullReport> {
    let start = Instant::now();
    let mut report = PullReport::default();
    let wants_windows = options.includes(Table::Offers) || options.includes(Table::Campaigns);
    let bindings = discover(
        store,
        |table| {
            (table.is_pullable() && options.includes(table))
                || (table == Table::Windows && wants_windows)
        },
        &mut report.diagnostics,
    )?;

    let gate = options.gate_field();
    let mut tables = TableSet::new();
    for table in Table::ALL {
        if !table.is_pullable() || !options.includes(table) {
            continue;
        }
        let Some(binding) = bindings.get(&table) else {
            report.diagnostics.warn(
                table.name(),
                None,
                "table not found on the remote side; skipped",
            );
            continue;
        };
        let Some(gate_field) = binding.remote_name(&gate) else {
            report.diagnostics.warn(
                table.name(),
                None,
                format!("no {gate} checkbox on the remote table; skipped"),
            );
            continue;
        };
        let rows = store.query(&binding.table_id, Some(&RowFilter::checked(gate_field)))?;
        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let record = binding.to_canonical(&row.fields);
            // Rows skipped for lack of a key stay flagged so the editor sees them again.
            if !codec::text(&record, table.key_field()).is_empty() {
                report.flagged.push(FlaggedRow {
                    table,
                    row_id: row.id,
                    field: gate_field.to_string(),
                });
            }
            records.push(record);
        }
        tracing::info!(table = table.name(), rows = records.len(), "read flagged rows");
        report.rows += records.len();
        tables.insert(table, records);
    }

    if let Some(binding) = bindings.get(&Table::Windows) {
        let rows = store.query(&binding.table_id, None)?;
        let records = rows
            .iter()
            .map(|row| binding.to_canonical(&row.fields))
            .collect();
        tables.insert(Table::Windows, records);
    }

    let reconstruction = reconstruct(&tables);
    report.diagnostics.extend(reconstruction.diagnostics);
    if options.dry_run {
        tracing::info!(patches = reconstruction.patches.total(), "dry run; catalogue untouched");
    } else {
        report.outcome = apply_patches(catalog, &reconstruction.patches, &mut report.diagnostics);
    }
    report.patches = reconstruction.patches;

    tracing::info!(
        rows = report.rows,
        patches = report.patches.total(),
        updated = report.outcome.updated,
        created = report.outcome.created,
        elapsed_ms = start.elapsed().as_millis(),
        "pull complete"
    );
    Ok(report)
}

/// Clear the sync checkbox on pulled rows. Safe to repeat.
pub fn acknowledge(store: &mut dyn RecordStore, flagged: &[FlaggedRow]) -> Result<usize> {
    for row in flagged {
        let mut clear = FlatRecord::new();
        clear.put_bool(&row.field, false);
        store.update_row(&row.row_id, &clear)?;
    }
    tracing::info!(rows = flagged.len(), "cleared sync flags");
    Ok(flagged.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Card, RewardModule};
    use crate::flat::FieldValue;
    use crate::store::{MemoryStore, Schema};
    use serde_json::json;

    fn catalog() -> Catalog {
        let mut catalog: Catalog = serde_json::from_value(json!({
            "cards": [{"id": "cardA", "name": "Card A", "rewardModules": ["offerX"]}],
            "categories": {"dining": {"label": "Dining", "order": 1}},
            "modules": {
                "offerX": {"type": "category", "rate": 4, "match": ["dining"],
                           "valid_from": "2026-01-01", "valid_to": "2026-03-31",
                           "promo_end": "2026-03-31"}
            },
            "campaigns": [{
                "id": "spring", "name": "Spring",
                "sections": [{"type": "progress", "label": "Spend"}]
            }]
        }))
        .expect("catalog");
        catalog.cards.push(Card {
            id: "cardB".to_string(),
            name: "Card B".to_string(),
            ..Default::default()
        });
        catalog
    }

    fn row_id(store: &MemoryStore, title: &str, key: &str) -> String {
        let table = store.table_by_title(title).expect("table");
        let key_field = Table::ALL
            .into_iter()
            .find(|t| t.name() == title)
            .map(Table::key_field)
            .expect("canonical table");
        table
            .rows
            .iter()
            .find(|row| codec::text(&row.fields, key_field) == key)
            .map(|row| row.id.clone())
            .expect("row")
    }

    #[test]
    fn push_creates_fields_and_rows_then_updates_in_place() {
        let mut store = MemoryStore::with_canonical_tables();
        let catalog = catalog();
        let report = push(&mut store, &catalog, &SyncOptions::default()).expect("push");
        assert_eq!(report.updated, 0);
        assert!(report.created > 0);
        assert!(report.fields_created > 0);

        let offers = store.table_by_title("offers").expect("offers");
        assert_eq!(offers.schema.get(field::SYNC), Some(&FieldType::Checkbox));
        assert_eq!(offers.rows.len(), 1);
        // Relation fields are never created automatically.
        let sections = store.table_by_title("campaign_sections").expect("sections");
        assert!(!sections.schema.contains_key(field::CAMPAIGN));
        assert!(report.diagnostics.mentions("campaign_sections", field::CAMPAIGN));

        let again = push(&mut store, &catalog, &SyncOptions::default()).expect("second push");
        assert_eq!(again.created, 0);
        assert_eq!(again.updated, report.created);
        assert_eq!(store.table_by_title("offers").expect("offers").rows.len(), 1);
    }

    #[test]
    fn section_rows_link_to_campaign_rows() {
        // Relations cannot be auto-created; stand in for a hand-made field.
        let mut linked = MemoryStore::new();
        for table in Table::ALL {
            let mut schema = Schema::from([(table.key_field().to_string(), FieldType::Title)]);
            if table == Table::CampaignSections {
                schema.insert(field::CAMPAIGN.to_string(), FieldType::Relation);
            }
            linked.add_table(table.name(), schema);
        }

        push(&mut linked, &catalog(), &SyncOptions::default()).expect("push");
        let campaign_row = row_id(&linked, "campaigns", "spring");
        let section = linked
            .table_by_title("campaign_sections")
            .expect("sections")
            .rows
            .first()
            .expect("section row")
            .clone();
        assert_eq!(
            section.fields.get(field::CAMPAIGN),
            Some(&FieldValue::Relation(vec![campaign_row]))
        );
    }

    #[test]
    fn pull_reads_only_flagged_rows_and_acknowledges_them() {
        let mut store = MemoryStore::with_canonical_tables();
        let mut catalog = catalog();
        push(&mut store, &catalog, &SyncOptions::default()).expect("push");

        let offer = row_id(&store, "offers", "offerX");
        store
            .set_field(&offer, field::REWARD_VALUE, FieldValue::Number(Some(6.0)))
            .expect("edit");
        store
            .set_field(&offer, field::SYNC, FieldValue::Checkbox(true))
            .expect("flag");
        let card = row_id(&store, "cards", "cardB");
        store
            .set_field(&card, field::NAME, FieldValue::Text("Ignored".to_string()))
            .expect("unflagged edit");

        let report = pull(&mut store, &mut catalog, &SyncOptions::default()).expect("pull");
        assert_eq!(report.rows, 1);
        assert_eq!(report.flagged.len(), 1);
        assert_eq!(catalog.modules["offerX"].rate, Some(6.0));
        assert_eq!(catalog.cards[1].name, "Card B");

        assert_eq!(acknowledge(&mut store, &report.flagged).expect("ack"), 1);
        let again = pull(&mut store, &mut catalog, &SyncOptions::default()).expect("pull again");
        assert_eq!(again.rows, 0);
        assert!(again.patches.is_empty());
    }

    #[test]
    fn dry_run_leaves_catalogue_untouched() {
        let mut store = MemoryStore::with_canonical_tables();
        let mut catalog = catalog();
        push(&mut store, &catalog, &SyncOptions::default()).expect("push");
        let offer = row_id(&store, "offers", "offerX");
        store
            .set_field(&offer, field::REWARD_VALUE, FieldValue::Number(Some(9.0)))
            .expect("edit");
        store
            .set_field(&offer, field::SYNC, FieldValue::Checkbox(true))
            .expect("flag");

        let before = catalog.clone();
        let options = SyncOptions {
            dry_run: true,
            ..SyncOptions::default()
        };
        let report = pull(&mut store, &mut catalog, &options).expect("pull");
        assert_eq!(catalog, before);
        assert_eq!(
            report.patches.modules.get("offerX").map(|patch| patch["rate"].clone()),
            Some(json!(9))
        );
    }

    #[test]
    fn missing_tables_and_gate_fields_are_skipped_with_warnings() {
        let mut store = MemoryStore::new();
        store.add_table(
            "Promotions",
            Schema::from([("Promo ID".to_string(), FieldType::Title)]),
        );
        let mut catalog = Catalog::default();
        let options = SyncOptions {
            tables: Some(BTreeSet::from([Table::Campaigns, Table::Cards])),
            ..SyncOptions::default()
        };
        let report = pull(&mut store, &mut catalog, &options).expect("pull");
        assert_eq!(report.rows, 0);
        assert!(report.diagnostics.mentions("cards", "not found"));
        assert!(report.diagnostics.mentions("campaigns", "checkbox"));
    }

    #[test]
    fn table_filter_limits_push() {
        let mut store = MemoryStore::with_canonical_tables();
        let options = SyncOptions {
            tables: Some(BTreeSet::from([Table::Cards])),
            ..SyncOptions::default()
        };
        let report = push(&mut store, &catalog(), &options).expect("push");
        assert_eq!(report.tables, 1);
        assert_eq!(report.created, 2);
        assert!(store.table_by_title("offers").expect("offers").rows.is_empty());
    }

    #[test]
    fn module_documents_keep_unrelated_fields_after_pull() {
        let mut store = MemoryStore::with_canonical_tables();
        let mut catalog = catalog();
        catalog.modules.insert(
            "plain".to_string(),
            RewardModule {
                kind: "always".to_string(),
                multiplier: Some(2.0),
                ..Default::default()
            },
        );
        push(&mut store, &catalog, &SyncOptions::default()).expect("push");
        let offer = row_id(&store, "offers", "plain");
        store
            .set_field(&offer, field::SYNC, FieldValue::Checkbox(true))
            .expect("flag");
        pull(&mut store, &mut catalog, &SyncOptions::default()).expect("pull");
        assert_eq!(catalog.modules["plain"].multiplier, Some(2.0));
        assert_eq!(catalog.modules["plain"].kind, "always");
    }

    #[test]
    fn values_removed_locally_are_cleared_remotely_and_stay_gone() {
        let mut store = MemoryStore::with_canonical_tables();
        let mut catalog = catalog();
        catalog.modules.insert(
            "capped".to_string(),
            RewardModule {
                kind: "always".to_string(),
                rate: Some(1.0),
                cap_mode: Some("reward".to_string()),
                cap_limit: Some(300.0),
                cap_key: Some("old_cap".to_string()),
                ..Default::default()
            },
        );
        push(&mut store, &catalog, &SyncOptions::default()).expect("push");

        let module = catalog.modules.get_mut("capped").expect("module");
        module.cap_mode = None;
        module.cap_limit = None;
        module.cap_key = None;
        push(&mut store, &catalog, &SyncOptions::default()).expect("second push");

        let offer = row_id(&store, "offers", "capped");
        let fields = &store
            .table_by_title("offers")
            .expect("offers")
            .rows
            .iter()
            .find(|row| row.id == offer)
            .expect("row")
            .fields;
        assert_eq!(fields.get(field::CAP_TYPE), Some(&FieldValue::Select(None)));
        assert_eq!(fields.get(field::CAP_LIMIT), Some(&FieldValue::Number(None)));
        assert_eq!(fields.get(field::CAP_KEY), Some(&FieldValue::Text(String::new())));

        store
            .set_field(&offer, field::SYNC, FieldValue::Checkbox(true))
            .expect("flag");
        pull(&mut store, &mut catalog, &SyncOptions::default()).expect("pull");
        let module = &catalog.modules["capped"];
        assert_eq!(module.cap_mode, None);
        assert_eq!(module.cap_limit, None);
        assert_eq!(module.cap_key, None);
        assert_eq!(module.rate, Some(1.0));
    }

    #[test]
    fn editor_can_shorten_offer_validity() {
        let mut store = MemoryStore::with_canonical_tables();
        let mut catalog = catalog();
        push(&mut store, &catalog, &SyncOptions::default()).expect("push");

        let offer = row_id(&store, "offers", "offerX");
        store
            .set_field(&offer, field::VALID_TO, FieldValue::Text("2026-02-28".to_string()))
            .expect("edit");
        store
            .set_field(&offer, field::SYNC, FieldValue::Checkbox(true))
            .expect("flag");
        let report = pull(&mut store, &mut catalog, &SyncOptions::default()).expect("pull");

        let module = &catalog.modules["offerX"];
        assert_eq!(module.valid_to.as_deref(), Some("2026-02-28"));
        assert_eq!(module.promo_end.as_deref(), Some("2026-02-28"));
        assert_eq!(report.diagnostics.warnings().count(), 0);
    }
}

//! The standard task table of datasets, applications and catalogs.
//!
//! Each descriptor pairs a store filter with the equivalent check on a loaded
//! resource. Filters carry a `draft.` clause for every stage a draft goes
//! through; the in-memory checks then run on the draft view produced by the
//! draft merge adapter, so they only look at plain fields.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::config::{BATCH_PROCESSOR, FILES_MANAGER, FILES_PROCESSOR, SHORT_PROCESSOR};
use crate::util::clock::to_iso;

use super::{PipelineStatus as S, Resource, ResourceType, StructuredFilter as F, TaskDescriptor, TaskRegistry};

/// MIME types analyzed as CSV.
pub const CSV_TYPES: [&str; 3] = ["text/csv", "text/plain", "text/tab-separated-values"];

/// MIME types that need no normalization.
pub const BASIC_TYPES: [&str; 4] = [
    "text/csv",
    "text/plain",
    "text/tab-separated-values",
    "application/geo+json",
];

const GEOJSON: &str = "application/geo+json";
const PUBLICATION_PENDING: [&str; 2] = ["waiting", "deleted"];
const DRAFT: &str = "draft.";

/// Registry holding the standard tasks in priority order.
#[must_use]
pub fn standard_registry() -> TaskRegistry {
    let builder = dataset_tasks()
        .into_iter()
        .fold(TaskRegistry::builder(), |b, d| b.register(ResourceType::Datasets, d));
    builder
        .register(ResourceType::Applications, publish_application())
        .register(ResourceType::Catalogs, harvest())
        .build()
}

fn dataset_tasks() -> Vec<TaskDescriptor> {
    vec![
        TaskDescriptor::new(
            "initialize",
            FILES_MANAGER,
            |_| F::eq("status", S::Created),
            |r, _| r.status_is(S::Created),
        )
        .with_events_prefix("initialize"),
        TaskDescriptor::new(
            "storeFile",
            FILES_MANAGER,
            |_| both_tracks(|p| F::eq(format!("{p}status"), S::Loaded)),
            |r, _| r.status_is(S::Loaded),
        )
        .with_events_prefix("store"),
        TaskDescriptor::new(
            "downloadFile",
            FILES_MANAGER,
            |_| both_tracks(|p| F::eq(format!("{p}status"), S::Imported)),
            |r, _| r.status_is(S::Imported),
        )
        .with_events_prefix("download"),
        TaskDescriptor::new(
            "normalizeFile",
            FILES_PROCESSOR,
            |_| {
                F::and([
                    F::ne("isRest", true),
                    both_tracks(|p| {
                        F::and([
                            F::eq(format!("{p}status"), S::Stored),
                            F::not_in(format!("{p}originalFile.mimetype"), BASIC_TYPES),
                        ])
                    }),
                ])
            },
            |r, _| r.status_is(S::Stored) && is_file_dataset(r) && !is_normalized(r),
        )
        .with_events_prefix("normalize"),
        TaskDescriptor::new(
            "analyzeCsv",
            FILES_PROCESSOR,
            |_| both_tracks(|p| F::and([normalized(p), F::is_in(format!("{p}file.mimetype"), CSV_TYPES)])),
            |r, _| {
                is_file_dataset(r) && is_normalized(r) && r.file_mimetype().is_some_and(|m| CSV_TYPES.contains(&m))
            },
        )
        .with_events_prefix("analyze"),
        TaskDescriptor::new(
            "analyzeGeojson",
            FILES_PROCESSOR,
            |_| both_tracks(|p| F::and([normalized(p), F::eq(format!("{p}file.mimetype"), GEOJSON)])),
            |r, _| is_file_dataset(r) && is_normalized(r) && r.file_mimetype() == Some(GEOJSON),
        )
        .with_events_prefix("analyze"),
        TaskDescriptor::new(
            "validateFile",
            BATCH_PROCESSOR,
            |_| {
                let stage = [S::Analyzed, S::ValidationUpdated];
                F::or([
                    F::and([F::exists("file", true), F::is_in("status", stage)]),
                    F::and([
                        F::or([F::exists("file", true), F::exists("draft.file", true)]),
                        F::is_in("draft.status", stage),
                    ]),
                ])
            },
            |r, _| r.get("file").is_some() && (r.status_is(S::Analyzed) || r.status_is(S::ValidationUpdated)),
        )
        .with_events_prefix("validate"),
        TaskDescriptor::new(
            "extend",
            BATCH_PROCESSOR,
            |_| both_tracks(|p| F::and([validated(p), active_extension(p)])),
            |r, _| is_validated(r) && has_active_extension(r),
        )
        .with_events_prefix("extend"),
        TaskDescriptor::new(
            "indexLines",
            BATCH_PROCESSOR,
            |_| {
                F::or([
                    both_tracks(|p| F::and([validated(p), F::not(active_extension(p))])),
                    both_tracks(|p| F::eq(format!("{p}status"), S::Extended)),
                    F::and([F::eq("isRest", true), F::eq("_partialRestStatus", "extended")]),
                ])
            },
            |r, _| {
                (is_validated(r) && !has_active_extension(r))
                    || r.status_is(S::Extended)
                    || (r.is_rest() && r.str_at("_partialRestStatus") == Some("extended"))
            },
        )
        .with_events_prefix("index"),
        TaskDescriptor::new(
            "finalize",
            SHORT_PROCESSOR,
            |_| {
                F::or([
                    both_tracks(|p| F::eq(format!("{p}status"), S::Indexed)),
                    F::and([F::eq("isRest", true), F::eq("_partialRestStatus", "indexed")]),
                ])
            },
            |r, _| r.status_is(S::Indexed) || (r.is_rest() && r.str_at("_partialRestStatus") == Some("indexed")),
        )
        .with_events_prefix("finalize"),
        TaskDescriptor::new(
            "exportRest",
            BATCH_PROCESSOR,
            |now| {
                F::and([
                    F::eq("status", S::Finalized),
                    F::eq("isRest", true),
                    F::eq("exports.restToCSV.active", true),
                    F::lt("exports.restToCSV.nextExport", to_iso(now)),
                ])
            },
            |r, now| {
                r.status_is(S::Finalized)
                    && r.is_rest()
                    && r.flag("exports.restToCSV.active")
                    && is_due(r, "exports.restToCSV.nextExport", now)
            },
        ),
        TaskDescriptor::new(
            "publishDataset",
            SHORT_PROCESSOR,
            |_| {
                F::and([
                    F::or([F::eq("isMetaOnly", true), F::eq("status", S::Finalized)]),
                    F::exists("draftReason", false),
                    F::is_in("publications.status", PUBLICATION_PENDING),
                ])
            },
            |r, _| {
                (r.flag("isMetaOnly") || r.status_is(S::Finalized))
                    && r.get("draftReason").is_none()
                    && has_pending_publication(r)
            },
        ),
        TaskDescriptor::new(
            "renewApiKey",
            SHORT_PROCESSOR,
            |now| F::and([F::eq("readApiKey.active", true), F::lt("readApiKey.renewAt", to_iso(now))]),
            |r, now| r.flag("readApiKey.active") && is_due(r, "readApiKey.renewAt", now),
        ),
        TaskDescriptor::new(
            "manageTTL",
            SHORT_PROCESSOR,
            |now| {
                F::and([
                    F::eq("status", S::Finalized),
                    F::gt("count", 0),
                    F::eq("isRest", true),
                    F::eq("rest.ttl.active", true),
                    F::or([
                        F::lt("rest.ttl.checkedAt", to_iso(ttl_horizon(now))),
                        F::exists("rest.ttl.checkedAt", false),
                    ]),
                ])
            },
            |r, now| {
                r.status_is(S::Finalized)
                    && r.is_rest()
                    && r.flag("rest.ttl.active")
                    && r.get("count").and_then(Value::as_f64).is_some_and(|c| c > 0.0)
                    && r.str_at("rest.ttl.checkedAt").is_none_or(|at| at < to_iso(ttl_horizon(now)).as_str())
            },
        ),
        TaskDescriptor::new(
            "autoUpdate",
            SHORT_PROCESSOR,
            |now| {
                F::and([
                    F::eq("remoteFile.autoUpdate.active", true),
                    F::lt("remoteFile.autoUpdate.nextUpdate", to_iso(now)),
                    F::exists("draftReason", false),
                ])
            },
            |r, now| {
                r.flag("remoteFile.autoUpdate.active")
                    && is_due(r, "remoteFile.autoUpdate.nextUpdate", now)
                    && r.get("draftReason").is_none()
            },
        ),
        TaskDescriptor::new(
            "errorRetry",
            SHORT_PROCESSOR,
            |now| {
                let now = to_iso(now);
                both_tracks(|p| {
                    F::and([
                        F::eq(format!("{p}status"), S::Error),
                        F::exists(format!("{p}errorStatus"), true),
                        F::lte(format!("{p}errorRetry"), now.as_str()),
                    ])
                })
            },
            |r, now| retry_due(r, "", now) || retry_due(r, DRAFT, now),
        ),
        TaskDescriptor::new(
            "autoUpdateExtension",
            SHORT_PROCESSOR,
            |now| {
                F::and([
                    F::eq("status", S::Finalized),
                    F::eq("isRest", true),
                    F::lt("extensions.nextUpdate", to_iso(now)),
                ])
            },
            |r, now| {
                let now = to_iso(now);
                r.status_is(S::Finalized)
                    && r.is_rest()
                    && r.array("extensions").iter().any(|e| {
                        e.get("nextUpdate").and_then(Value::as_str).is_some_and(|at| at < now.as_str())
                    })
            },
        ),
    ]
}

fn publish_application() -> TaskDescriptor {
    TaskDescriptor::new(
        "publishApplication",
        SHORT_PROCESSOR,
        |_| F::is_in("publications.status", PUBLICATION_PENDING),
        |r, _| has_pending_publication(r),
    )
}

fn harvest() -> TaskDescriptor {
    TaskDescriptor::new(
        "harvest",
        SHORT_PROCESSOR,
        |now| F::and([F::eq("autoUpdate.active", true), F::lt("autoUpdate.nextUpdate", to_iso(now))]),
        |r, now| r.flag("autoUpdate.active") && is_due(r, "autoUpdate.nextUpdate", now),
    )
}

/// `clause("") OR clause("draft.")`.
fn both_tracks(clause: impl Fn(&str) -> F) -> F {
    F::or([clause(""), clause(DRAFT)])
}

fn normalized(p: &str) -> F {
    F::or([
        F::and([
            F::eq(format!("{p}status"), S::Stored),
            F::is_in(format!("{p}originalFile.mimetype"), BASIC_TYPES),
        ]),
        F::eq(format!("{p}status"), S::Normalized),
    ])
}

/// REST datasets have no draft, their clauses only exist on the main track.
fn validated(p: &str) -> F {
    let file = F::and([F::exists(format!("{p}file"), true), F::eq(format!("{p}status"), S::Validated)]);
    if !p.is_empty() {
        return file;
    }
    F::or([
        file,
        F::and([F::eq("isRest", true), F::eq("status", S::Analyzed)]),
        F::and([F::eq("isRest", true), F::eq("_partialRestStatus", "updated")]),
    ])
}

fn active_extension(p: &str) -> F {
    F::eq(format!("{p}extensions.active"), true)
}

fn is_file_dataset(r: &Resource) -> bool {
    !r.is_rest() && !r.flag("isVirtual") && !r.flag("isMetaOnly")
}

fn is_normalized(r: &Resource) -> bool {
    let basic_original = r
        .str_at("originalFile.mimetype")
        .is_some_and(|m| BASIC_TYPES.contains(&m));
    (r.status_is(S::Stored) && basic_original) || r.status_is(S::Normalized)
}

fn is_validated(r: &Resource) -> bool {
    (is_file_dataset(r) && r.get("file").is_some() && r.status_is(S::Validated))
        || (r.is_rest() && (r.status_is(S::Analyzed) || r.str_at("_partialRestStatus") == Some("updated")))
}

fn has_active_extension(r: &Resource) -> bool {
    r.array("extensions")
        .iter()
        .any(|e| e.get("active").and_then(Value::as_bool) == Some(true))
}

fn has_pending_publication(r: &Resource) -> bool {
    r.array("publications").iter().any(|p| {
        p.get("status")
            .and_then(Value::as_str)
            .is_some_and(|s| PUBLICATION_PENDING.contains(&s))
    })
}

/// The timestamp at `path` is strictly before `now`.
fn is_due(r: &Resource, path: &str, now: DateTime<Utc>) -> bool {
    r.str_at(path).is_some_and(|at| at < to_iso(now).as_str())
}

fn retry_due(r: &Resource, p: &str, now: DateTime<Utc>) -> bool {
    r.str_at(&format!("{p}status")) == Some(S::Error.as_str())
        && r.get(&format!("{p}errorStatus")).is_some()
        && r.str_at(&format!("{p}errorRetry"))
            .is_some_and(|at| at <= to_iso(now).as_str())
}

fn ttl_horizon(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::hours(1)
}

//! URIs of the job-tracking vocabulary as stored in the graph.

pub const TASK_HARVESTING_CLEANING: &str =
    "http://lblod.data.gift/id/jobs/concept/TaskOperation/cleaning";
pub const TASK_COLLECTING: &str =
    "http://lblod.data.gift/id/jobs/concept/TaskOperation/collecting";

pub const STATUS_BUSY: &str = "http://redpencil.data.gift/id/concept/JobStatus/busy";
pub const STATUS_SCHEDULED: &str = "http://redpencil.data.gift/id/concept/JobStatus/scheduled";
pub const STATUS_SUCCESS: &str = "http://redpencil.data.gift/id/concept/JobStatus/success";
pub const STATUS_FAILED: &str = "http://redpencil.data.gift/id/concept/JobStatus/failed";

pub const JOB_TYPE: &str = "http://vocab.deri.ie/cogs#Job";
pub const SCHEDULED_JOB_TYPE: &str = "http://vocab.deri.ie/cogs#ScheduledJob";
pub const TASK_TYPE: &str = "http://redpencil.data.gift/vocabularies/tasks/Task";
pub const ERROR_TYPE: &str = "http://open-services.net/ns/core#Error";
pub const ERROR_URI_PREFIX: &str = "http://redpencil.data.gift/id/jobs/error/";

pub const STATUS_PREDICATE: &str = "http://www.w3.org/ns/adms#status";

/// Predicates through which other nodes hold on to a logical file. These are
/// drained before the file's own triples are removed.
pub const FILE_OWNERSHIP_PREDICATES: [&str; 4] = [
    "http://redpencil.data.gift/vocabularies/tasks/hasFile",
    "http://www.semanticdesktop.org/ontologies/2007/01/19/nie#dataSource",
    "http://oscaf.sourceforge.net/ndo.html#copiedFrom",
    "http://purl.org/dc/terms/hasPart",
];

/// Job/task operations that produce a dump of the full graph. The most recent
/// successful one bounds which successful harvest jobs may be cleaned.
pub const DUMP_OPERATIONS: [&str; 4] = [
    "http://redpencil.data.gift/id/jobs/concept/JobOperation/deltas/deltaDumpFileCreation/besluiten",
    "http://redpencil.data.gift/id/jobs/concept/TaskOperation/deltas/deltaDumpFileCreation",
    "http://redpencil.data.gift/id/jobs/concept/TaskOperation/deltas/initialPublicationGraphSyncing",
    "http://redpencil.data.gift/id/jobs/concept/JobOperation/deltas/initialPublicationGraphSyncing/besluiten",
];

pub const PREFIXES: &str = "
  PREFIX xsd: <http://www.w3.org/2001/XMLSchema#>
  PREFIX terms: <http://purl.org/dc/terms/>
  PREFIX prov: <http://www.w3.org/ns/prov#>
  PREFIX nie: <http://www.semanticdesktop.org/ontologies/2007/01/19/nie#>
  PREFIX nfo: <http://www.semanticdesktop.org/ontologies/2007/03/22/nfo#>
  PREFIX mu: <http://mu.semte.ch/vocabularies/core/>
  PREFIX task: <http://redpencil.data.gift/vocabularies/tasks/>
  PREFIX dct: <http://purl.org/dc/terms/>
  PREFIX oslc: <http://open-services.net/ns/core#>
  PREFIX cogs: <http://vocab.deri.ie/cogs#>
  PREFIX adms: <http://www.w3.org/ns/adms#>
";

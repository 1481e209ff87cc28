use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    #[envconfig(from = "HOST", default = "0.0.0.0")]
    pub host: String,

    #[envconfig(from = "PORT", default = "8080")]
    pub port: u16,

    #[envconfig(from = "HIGH_LOAD_DATABASE_ENDPOINT", default = "http://virtuoso:8890/sparql")]
    pub sparql_endpoint: String,

    #[envconfig(from = "DEFAULT_GRAPH", default = "http://mu.semte.ch/graphs/harvesting")]
    pub default_graph: String,

    #[envconfig(from = "MAX_DAYS_TO_KEEP_SUCCESSFUL_JOBS", default = "30")]
    pub max_days_to_keep_successful_jobs: u32,

    #[envconfig(from = "MAX_DAYS_TO_KEEP_FAILED_JOBS", default = "7")]
    pub max_days_to_keep_failed_jobs: u32,

    #[envconfig(from = "MAX_DAYS_TO_KEEP_BUSY_JOBS", default = "7")]
    pub max_days_to_keep_busy_jobs: u32,

    /// Comma-separated job operation allow-list. Empty means every operation
    /// qualifies for the failed/busy retention windows.
    #[envconfig(from = "JOB_OPERATIONS", default = "")]
    pub job_operations: String,

    #[envconfig(from = "FILE_BATCH_SIZE", default = "5000")]
    pub file_batch_size: u32,

    #[envconfig(from = "FILE_DELETE_CONCURRENCY", default = "1")]
    pub file_delete_concurrency: usize,

    #[envconfig(from = "SHARE_FOLDER", default = "/share")]
    pub share_folder: String,
}

impl Config {
    pub fn bind(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn operation_allow_list(&self) -> Vec<String> {
        self.job_operations
            .split(',')
            .map(str::trim)
            .filter(|operation| !operation.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

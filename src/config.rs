use std::num::NonZeroUsize;
use std::path::PathBuf;

/// Default Bolt endpoint of a local Neo4j instance
pub const DEFAULT_BOLT_URI: &str = "neo4j://localhost:7687";

pub const DEFAULT_USER: &str = "neo4j";

pub const DEFAULT_PASSWORD: &str = "qwerty123";

/// Maximum number of records per bulk store operation
pub const BATCH_SIZE: usize = 5000;

/// Progress is logged every N batches (and once more at the end of a step)
pub const PROGRESS_EVERY_BATCHES: usize = 5;

/// Connection attempts before the run gives up
pub const IMPORT_MAX_RETRIES: u32 = 5;

pub const IMPORT_RETRY_DELAY_SECS: u64 = 2;

/// Extra attempts for a single batch write after the first one fails
pub const BATCH_MAX_RETRIES: u32 = 3;

/// Initial backoff between batch attempts; doubled after every failure
pub const BATCH_RETRY_DELAY_MS: u64 = 200;

/// Relationship steps run one at a time unless raised
pub const RELATIONSHIP_PARALLELISM: usize = 1;

pub struct ImportConfig {
    /// Root the relative file paths of the import plan are resolved against
    pub data_dir: PathBuf,
    pub bolt_uri: String,
    pub user: String,
    pub password: String,
    pub batch_size: NonZeroUsize,
    pub batch_retries: u32,
    pub retry_delay_ms: u64,
    pub relationship_parallelism: usize,
    /// Load into an in-process graph instead of connecting to Neo4j
    pub dry_run: bool,
    pub report_path: Option<PathBuf>,
    pub show_progress: bool,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            bolt_uri: DEFAULT_BOLT_URI.to_string(),
            user: DEFAULT_USER.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
            batch_size: NonZeroUsize::new(BATCH_SIZE).unwrap_or(NonZeroUsize::MIN),
            batch_retries: BATCH_MAX_RETRIES,
            retry_delay_ms: BATCH_RETRY_DELAY_MS,
            relationship_parallelism: RELATIONSHIP_PARALLELISM,
            dry_run: false,
            report_path: None,
            show_progress: true,
        }
    }
}

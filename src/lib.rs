//! LDBC social-network bulk import into Neo4j
//!
//! Loads the pipe-delimited LDBC SNB files (persons, tags, forums, posts, comments,
//! organisations and the relations between them) into a property graph as a full
//! reload:
//!
//! 1. **Clear** -- delete every relationship, then every node
//! 2. **Index** -- one lookup index per node label on `id`
//! 3. **Nodes** -- each node file is loaded, typed and written in fixed-size batches
//! 4. **Relationships** -- each relation file is written in batches; endpoints are
//!    resolved by `id`, and rows whose endpoints do not resolve to exactly one node
//!    are skipped
//!
//! After every step the store is counted and compared with the number of source
//! records. A mismatch is logged, not treated as a failure. Any failing step aborts the
//! run; batches already committed stay in the store.
//!
//! # Key Modules
//!
//! - [`source`] -- Pipe-delimited file loading, date normalization, column typing
//! - [`columns`] -- Canonical names for `Entity.id` / `Entity.id.1` header columns
//! - [`batch`] -- Order-preserving fixed-size batches
//! - [`import`] -- Node and relationship importers, retry, verification
//! - [`pipeline`] -- Run state machine and top-level entry point
//! - [`schema`] -- The static LDBC file-to-graph mapping and its ordering check
//! - [`store`] -- Backend-agnostic graph operations
//! - [`neo4j`] -- Bolt backend with `UNWIND` batch queries
//! - [`memory`] -- In-process backend for dry runs and tests
//! - [`models`] -- Typed values, records, labels and relationship types
//! - [`stats`] -- Run counters
//! - [`config`] -- Defaults and run configuration
//!
//! # Example Usage
//!
//! ```bash
//! # Show the import plan and check its ordering
//! ldbc-loader plan
//!
//! # Import the files under ./data into a local Neo4j
//! ldbc-loader -v import --data-dir data --bolt-uri neo4j://localhost:7687
//!
//! # Validate files and endpoint resolution without a server
//! ldbc-loader -v import --data-dir data --dry-run --report report.json
//! ```

pub mod batch;
pub mod columns;
pub mod config;
pub mod error;
pub mod import;
pub mod memory;
pub mod models;
pub mod neo4j;
pub mod pipeline;
pub mod schema;
pub mod source;
pub mod stats;
pub mod store;

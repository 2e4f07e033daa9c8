//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Project layout constants
pub mod layout {
    /// Project data directory name
    pub const DATA_DIR: &str = ".docweave";

    /// State database relative to the data directory
    pub const STATE_DB_PATH: &str = "state/docweave.db";

    /// Default document output directory relative to the data directory
    pub const OUTPUT_DIR: &str = "docs";

    /// Config file relative to the data directory
    pub const CONFIG_FILE: &str = "config.toml";

    /// Generator tag written into document trailers
    pub const GENERATOR: &str = "docweave-three-tier";
}

/// Commit and locking constants
pub mod commit {
    /// Wait before the single retry of a contended commit lock (milliseconds)
    pub const LOCK_RETRY_DELAY_MS: u64 = 500;

    /// Locks older than this are considered abandoned (seconds)
    pub const STALE_LOCK_SECS: u64 = 600;
}

/// Pipeline constants
pub mod pipeline {
    /// Maximum concurrent scout invocations
    pub const SCOUT_CONCURRENCY: usize = 4;

    /// Maximum concurrent writer invocations
    pub const WRITER_CONCURRENCY: usize = 4;

    /// Timeout for a single scout/planner/writer call (seconds)
    pub const AGENT_TIMEOUT_SECS: u64 = 900;

    /// Characters of existing document content handed to scouts and planner
    pub const EXISTING_DOC_SNIPPET_CHARS: usize = 3000;

    /// Maximum changed paths listed in a diff-focused scout prompt
    pub const MAX_DIFF_PATHS_IN_PROMPT: usize = 200;

    /// Default focus areas for first-time exploration
    pub const DEFAULT_FOCUS_AREAS: &[&str] = &[
        "structure: repository layout, entry points, build and packaging",
        "architecture: core modules, data flow, key abstractions",
        "interfaces: public APIs, CLI surfaces, configuration",
    ];

    /// Focus keys of the scout reports each document type is written from.
    ///
    /// The key is the focus text before its first `:`. Structure reports are
    /// always included; unlisted types get every report.
    pub const SCOUT_RELEVANCE: &[(&str, &[&str])] = &[
        ("overview", &["architecture"]),
        ("capabilities", &["interfaces", "architecture"]),
        ("quickstart", &["interfaces"]),
        ("architecture", &["architecture"]),
        ("api", &["interfaces", "architecture"]),
        ("config", &["interfaces"]),
        ("guide", &["interfaces", "architecture"]),
        ("data-model", &["architecture", "interfaces"]),
        ("component", &["architecture", "interfaces"]),
        ("contributing", &[]),
    ];

    /// Focus key included for every document type
    pub const BASELINE_FOCUS: &str = "structure";

    /// Pages planned on a first run when the planner fails: (title, doc type, outline)
    pub const FALLBACK_PAGES: &[(&str, &str, &str)] = &[
        (
            "Overview",
            "overview",
            "What is this project?; Key Components",
        ),
        (
            "Capabilities",
            "capabilities",
            "User Stories; Feature Matrix; Key Workflows",
        ),
        (
            "Getting Started",
            "quickstart",
            "Prerequisites; Installation",
        ),
        (
            "Architecture",
            "architecture",
            "System Design; Components",
        ),
        ("API Reference", "api", "Public Interfaces"),
    ];
}

/// Provider chain constants
pub mod chain {
    /// Maximum total attempts across all providers
    pub const MAX_TOTAL_ATTEMPTS: usize = 6;

    /// Default maximum retries per provider
    pub const DEFAULT_MAX_RETRIES: u8 = 2;

    /// Base delay for exponential backoff (milliseconds)
    pub const BASE_DELAY_MS: u64 = 500;

    /// Maximum delay between retries (seconds)
    pub const MAX_DELAY_SECS: u64 = 30;

    /// Backoff multiplier
    pub const BACKOFF_FACTOR: f32 = 2.0;
}

/// HTTP/Network constants
pub mod network {
    /// Default request timeout (seconds)
    pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

    /// Timeout for git subprocesses (seconds)
    pub const GIT_TIMEOUT_SECS: u64 = 60;
}

/// Input validation constants
pub mod validation {
    /// Maximum accepted repository URL length
    pub const MAX_REPO_URL_LEN: usize = 500;

    /// Hosts accepted for remote repository references
    pub const ALLOWED_HOSTS: &[&str] = &["github.com", "gitlab.com", "bitbucket.org"];

    /// Maximum length of a title placed into a prompt
    pub const MAX_PROMPT_TITLE_LEN: usize = 255;
}

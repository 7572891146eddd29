//! Constants shared across the submission client
//!
//! Label keys, port assignments, env var names, and URL path components must
//! agree between the objects this client creates and the submission server
//! running inside the driver container.

/// Label identifying the driver pod; value is the app id
pub const DRIVER_LABEL: &str = "spark-driver";

/// Label carrying the app id; reserved, rejected in user-supplied labels
pub const APP_ID_LABEL: &str = "spark-app-selector";

/// Label carrying the user-visible application name
pub const APP_NAME_LABEL: &str = "spark-app-name";

/// Name of the driver container inside the driver pod
pub const DRIVER_CONTAINER_NAME: &str = "spark-kubernetes-driver";

/// Port the in-pod submission server listens on
pub const SUBMISSION_SERVER_PORT: i32 = 7077;

/// Port name for the submission server port (Service and container)
pub const SUBMISSION_SERVER_PORT_NAME: &str = "submission";

/// Port name for the driver UI port
pub const UI_PORT_NAME: &str = "spark-ui";

/// Port name for the driver RPC port
pub const DRIVER_PORT_NAME: &str = "driver";

/// Port name for the block manager port
pub const BLOCK_MANAGER_PORT_NAME: &str = "blockmanager";

/// URL path component routing to the submission server
pub const SUBMISSION_PATH_COMPONENT: &str = "submission";

/// URL path component routing to the driver UI
pub const UI_PATH_COMPONENT: &str = "ui";

/// Key of the submission secret inside the Secret's data map; also the file
/// name the secret is mounted as
pub const SUBMISSION_SECRET_KEY: &str = "spark-submission-secret";

/// Name prefix of the one-time submission Secret; the app id is appended
pub const SUBMISSION_SECRET_NAME_PREFIX: &str = "submission-app-secret-";

/// Directory under which per-app secret volumes are mounted in the driver
pub const DRIVER_SECRETS_BASE_DIR: &str = "/var/run/secrets/spark-submission";

/// Env var telling the driver where the mounted submission secret lives
pub const ENV_SUBMISSION_SECRET_LOCATION: &str = "SPARK_SUBMISSION_SECRET_LOCATION";

/// Env var telling the driver which port to serve submissions on
pub const ENV_SUBMISSION_SERVER_PORT: &str = "SPARK_SUBMISSION_SERVER_PORT";

/// Env var telling the driver the base path it is served under
pub const ENV_SUBMISSION_SERVER_BASE_PATH: &str = "SPARK_SUBMISSION_SERVER_BASE_PATH";

/// Number of random bytes in the submission secret (before base64)
pub const SUBMISSION_SECRET_BYTES: usize = 128;

/// Per-server RPC retries when connecting through node ports
pub const SUBMISSION_CLIENT_RETRIES_NODE_PORT: u32 = 3;

/// Per-server RPC retries when connecting through an ingress
pub const SUBMISSION_CLIENT_RETRIES_INGRESS: u32 = 5;

/// Connect timeout for the submission RPC client, in milliseconds
pub const SUBMISSION_CLIENT_CONNECT_TIMEOUT_MS: u64 = 5000;

/// Default driver UI port
pub const DEFAULT_UI_PORT: i32 = 4040;

/// Default driver RPC port
pub const DEFAULT_DRIVER_PORT: i32 = 7078;

/// Default block manager port
pub const DEFAULT_BLOCK_MANAGER_PORT: i32 = 7079;

/// Default timeout waiting for the driver to become submittable, in seconds
pub const DEFAULT_DRIVER_SUBMIT_TIMEOUT_SECS: u64 = 60;

/// Default interval between pod phase reports while waiting for completion
pub const DEFAULT_REPORT_INTERVAL_SECS: u64 = 5;

/// Ping path relative to a discovered submission base URL
pub const PING_PATH: &str = "v1/submissions/ping";

/// Submit path relative to a discovered submission base URL
pub const SUBMIT_PATH: &str = "v1/submissions/create";

use clap::{Parser, ValueEnum};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const LINDORM_BASE_DOMAIN: &str = "lindorm.aliyuncs.com";

/// Transport the MCP dispatcher is served over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Transport {
    /// JSON-RPC over stdin/stdout (what desktop agents spawn).
    Stdio,
    /// JSON-RPC over `POST /mcp`, plus health and metrics routes.
    Http,
}

impl Transport {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "stdio" => Some(Self::Stdio),
            "http" | "streamable-http" => Some(Self::Http),
            _ => None,
        }
    }
}

/// Command-line fallbacks. Environment variables win when both are set.
#[derive(Debug, Parser)]
#[command(name = "lindorm-mcp", version, about = "Lindorm MCP server")]
pub struct Args {
    /// Lindorm instance ID, used to derive the endpoint hosts
    #[arg(long)]
    pub lindorm_instance_id: Option<String>,

    /// Use the VPC endpoints instead of the public ones
    #[arg(long, default_value_t = false)]
    pub using_vpc: bool,

    /// Lindorm username
    #[arg(long, default_value = "root")]
    pub username: String,

    /// Lindorm password
    #[arg(long)]
    pub password: Option<String>,

    /// Text embedding model name
    #[arg(long)]
    pub embedding_model: Option<String>,

    /// Database the SQL tools run against
    #[arg(long, default_value = "default")]
    pub database: String,

    /// Directory full tool results are written to
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// MCP transport
    #[arg(long, value_enum)]
    pub transport: Option<Transport>,
}

pub struct Config {
    pub search_host: String,
    pub search_port: u16,
    pub ai_host: String,
    pub ai_port: u16,
    pub table_host: String,
    pub table_port: u16,
    pub username: String,
    pub password: String,
    pub text_embedding_model: String,
    /// Database the SQL tools run against; also names the SHOW TABLES header.
    pub table_database: String,
    pub cache_dir: PathBuf,
    pub embedding_connect_timeout: Duration,
    pub embedding_read_timeout: Duration,
    pub transport: Transport,
    /// Bind address for the HTTP transport.
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

impl Config {
    /// Load configuration from environment variables with sensible defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_env_and_args(Args::parse_from(["lindorm-mcp"]))
    }

    /// Load configuration from environment variables, falling back to `args`.
    ///
    /// Explicit `LINDORM_*_HOST` variables take precedence over hosts derived
    /// from the instance ID.
    pub fn from_env_and_args(args: Args) -> anyhow::Result<Self> {
        let instance_id = env::var("LINDORM_INSTANCE_ID")
            .ok()
            .or(args.lindorm_instance_id);
        let using_vpc = match env::var("USING_VPC_NETWORK") {
            Ok(value) => str_to_bool(&value),
            Err(_) => args.using_vpc,
        };

        let resolve_host = |var: &str, endpoint: &str| -> anyhow::Result<String> {
            if let Some(host) = env::var(var).ok().filter(|h| !h.is_empty()) {
                return Ok(host);
            }
            match instance_id.as_deref() {
                Some(id) => Ok(lindorm_host(id, endpoint, using_vpc)),
                None => Err(anyhow::anyhow!(
                    "{} is not set and no LINDORM_INSTANCE_ID was given to derive it",
                    var
                )),
            }
        };

        let transport = match env::var("MCP_TRANSPORT") {
            Ok(value) => Transport::parse(&value)
                .ok_or_else(|| anyhow::anyhow!("Unknown MCP_TRANSPORT: {}", value))?,
            Err(_) => args.transport.unwrap_or(Transport::Stdio),
        };

        Ok(Self {
            search_host: resolve_host("LINDORM_SEARCH_HOST", "proxy-search")?,
            search_port: env::var("SEARCH_PORT")
                .unwrap_or_else(|_| "30070".to_string())
                .parse()?,
            ai_host: resolve_host("LINDORM_AI_HOST", "proxy-ai")?,
            ai_port: env::var("AI_PORT")
                .unwrap_or_else(|_| "9002".to_string())
                .parse()?,
            table_host: resolve_host("LINDORM_TABLE_HOST", "proxy-lindorm")?,
            table_port: env::var("TABLE_PORT")
                .unwrap_or_else(|_| "33060".to_string())
                .parse()?,
            username: env::var("USERNAME").unwrap_or(args.username),
            password: env::var("PASSWORD")
                .ok()
                .or(args.password)
                .unwrap_or_default(),
            text_embedding_model: env::var("TEXT_EMBEDDING_MODEL")
                .ok()
                .or(args.embedding_model)
                .unwrap_or_default(),
            table_database: env::var("TABLE_DATABASE").unwrap_or(args.database),
            cache_dir: env::var("CACHE_DIR")
                .ok()
                .map(PathBuf::from)
                .or(args.cache_dir)
                .unwrap_or_else(|| PathBuf::from("./cache")),
            embedding_connect_timeout: Duration::from_secs(
                env::var("EMBEDDING_CONNECT_TIMEOUT")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            ),
            embedding_read_timeout: Duration::from_secs(
                env::var("EMBEDDING_READ_TIMEOUT")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()?,
            ),
            transport,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            shutdown_timeout_secs: env::var("SHUTDOWN_TIMEOUT")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
        })
    }

    /// Base URL of the search engine endpoint.
    pub fn search_url(&self) -> String {
        format!("http://{}:{}", self.search_host, self.search_port)
    }

    /// Base URL of the model inference endpoint.
    pub fn ai_url(&self) -> String {
        format!("http://{}:{}", self.ai_host, self.ai_port)
    }
}

/// Endpoint host for an instance, e.g. `ld-xxx-proxy-search-vpc.lindorm.aliyuncs.com`.
pub fn lindorm_host(instance_id: &str, endpoint: &str, using_vpc: bool) -> String {
    let network = if using_vpc { "vpc" } else { "pub" };
    format!(
        "{}-{}-{}.{}",
        instance_id, endpoint, network, LINDORM_BASE_DOMAIN
    )
}

pub fn str_to_bool(value: &str) -> bool {
    matches!(
        value.to_lowercase().as_str(),
        "true" | "1" | "yes" | "on" | "t"
    )
}

//! Command-line interface definitions for SaveMeAClick.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! All arguments can be provided via command-line flags or environment
//! variables; a `.env` file in the working directory is loaded first.

use clap::Parser;

/// Command-line arguments for the SaveMeAClick service.
///
/// Only the OpenAI API key is required. The Reddit and Instagram bots start
/// only when all of their credentials are present.
///
/// # Examples
///
/// ```sh
/// # Serve the API on the default port
/// OPENAI_API_KEY=sk-... save_me_a_click
///
/// # Custom port, streamed completions and a tuning file
/// save_me_a_click --openai-api-key sk-... -p 8080 --stream -c ./config.yaml
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// API key for the chat-completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: String,

    /// Port the HTTP API listens on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Allowed CORS origin (`*` for any)
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    /// Externally reachable base URL of this service, used by the bots
    #[arg(long, env = "API_URL")]
    pub api_url: Option<String>,

    /// Base URL of the OpenAI-compatible API
    #[arg(long, env = "OPENAI_BASE_URL")]
    pub openai_base_url: Option<String>,

    /// Chat model name
    #[arg(long, env = "OPENAI_MODEL")]
    pub model: Option<String>,

    /// Stream completions instead of waiting for the full reply
    #[arg(long, env = "OPENAI_STREAM")]
    pub stream: bool,

    /// Optional path to config.yaml file
    #[arg(short, long, env = "SMAC_CONFIG")]
    pub config: Option<String>,

    /// Reddit script-app client id
    #[arg(long, env = "REDDIT_CLIENT_ID")]
    pub reddit_client_id: Option<String>,

    /// Reddit script-app client secret
    #[arg(long, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
    pub reddit_client_secret: Option<String>,

    /// Reddit bot account name
    #[arg(long, env = "REDDIT_USERNAME")]
    pub reddit_username: Option<String>,

    /// Reddit bot account password
    #[arg(long, env = "REDDIT_PASSWORD", hide_env_values = true)]
    pub reddit_password: Option<String>,

    /// User agent sent to Reddit
    #[arg(long, env = "REDDIT_USER_AGENT", default_value = "SaveMeAClickBot/1.0.0")]
    pub reddit_user_agent: String,

    /// Instagram page access token
    #[arg(long, env = "INSTAGRAM_PAGE_ACCESS_TOKEN", hide_env_values = true)]
    pub instagram_page_access_token: Option<String>,

    /// Instagram (Facebook) app id
    #[arg(long, env = "INSTAGRAM_APP_ID")]
    pub instagram_app_id: Option<String>,

    /// Graph API version
    #[arg(long, env = "INSTAGRAM_API_VERSION", default_value = "v18.0")]
    pub instagram_api_version: String,

    /// Graph API base URL
    #[arg(long, env = "INSTAGRAM_BASE_URL", default_value = "https://graph.facebook.com")]
    pub instagram_base_url: String,
}

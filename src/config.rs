#[derive(clap::ValueEnum, Clone, Debug, Copy)]
pub enum CargoEnv {
    Development,
    Production,
}

#[derive(clap::Parser, Clone, Debug)]
pub struct AppConfig {
    // production or development
    #[clap(long, env, value_enum, default_value = "development")]
    pub cargo_env: CargoEnv,

    // port that the app will bind to
    #[clap(long, env, default_value = "5000")]
    pub port: u16,

    // this should be either * for allowing everything, or a comma seperated list of origins like
    // https://player.example.com,https://other.example.com
    #[clap(long, env, default_value = "*")]
    pub cors_origin: String,

    // where the channel list comes from, either an extended m3u or a json array of channels
    #[clap(long, env)]
    pub channel_feed_url: String,

    // how long a channel snapshot is considered fresh, an hour is plenty for fta lineups
    #[clap(long, env, default_value = "3600")]
    pub channel_refresh_secs: u64,

    // budget for an upstream call to produce response headers
    #[clap(long, env, default_value = "30")]
    pub upstream_timeout_secs: u64,

    // sent upstream unless the caller overrides it
    #[clap(
        long,
        env,
        default_value = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
    )]
    pub upstream_user_agent: String,

    // public base url used when rewriting playlists, something like https://tv.example.com
    // if it's not set the base is built from the Host / X-Forwarded-* headers
    #[clap(long, env)]
    pub public_url: Option<String>,

    // optional sentry integration
    #[clap(long, env)]
    pub sentry_dsn: Option<String>,
}

impl AppConfig {
    pub fn upstream_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.upstream_timeout_secs)
    }

    pub fn channel_refresh_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.channel_refresh_secs)
    }
}

impl Default for AppConfig {
    // mostly for tests, the binary always goes through clap
    fn default() -> Self {
        Self {
            cargo_env: CargoEnv::Development,
            port: 5000,
            cors_origin: "*".to_string(),
            channel_feed_url: "http://localhost:8080/channels.m3u".to_string(),
            channel_refresh_secs: 3600,
            upstream_timeout_secs: 30,
            upstream_user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            public_url: None,
            sentry_dsn: None,
        }
    }
}

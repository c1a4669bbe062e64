//! Tracing configuration and initialization.

use tracing_subscriber::EnvFilter;

type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

enum TrcMode {
    Foreground,
    Daemon,
}

pub struct Trc {
    mode: TrcMode,
    env_filter: EnvFilter,
}

impl Default for Trc {
    fn default() -> Self {
        let env_filter = EnvFilter::try_from_env("EXEC_FS_LOG")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"));

        Self {
            mode: TrcMode::Foreground,
            env_filter,
        }
    }
}

impl Trc {
    /// Switch to daemon formatting: timestamps kept, ANSI color off.
    #[must_use]
    pub fn for_daemon(mut self) -> Self {
        self.mode = TrcMode::Daemon;
        self
    }

    /// Raise the filter floor from repeated `-v` flags. The environment
    /// filter wins when set; this only replaces the fallback.
    #[must_use]
    pub fn with_verbosity(mut self, level: u8) -> Self {
        if level > 0 && EnvFilter::try_from_env("EXEC_FS_LOG").is_err() {
            let directive = if level == 1 { "debug" } else { "trace" };
            self.env_filter = EnvFilter::new(directive);
        }
        self
    }

    pub fn init(self) -> Result<(), InitError> {
        match self.mode {
            TrcMode::Foreground => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_target(false)
                .without_time()
                .compact()
                .try_init(),
            TrcMode::Daemon => tracing_subscriber::fmt()
                .with_env_filter(self.env_filter)
                .with_ansi(false)
                .try_init(),
        }
    }
}

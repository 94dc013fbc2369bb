use clap::{Args, Subcommand};

#[derive(Subcommand)]
pub enum Commands {
    /// Drain a simulated result with several concurrent consumers
    Drain {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long, default_value_t = 4, help = "Number of concurrent consumers")]
        consumers: usize,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<String>,
    },
    /// Walk a simulated result page by page with auto paging turned off
    Pages {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    #[arg(long, default_value_t = 1000, help = "Total rows in the simulated result")]
    pub rows: u64,

    #[arg(long, default_value_t = 100, help = "Rows per page")]
    pub page_size: u64,

    #[arg(long, default_value_t = 0, help = "Simulated latency of each page fetch")]
    pub latency_ms: u64,

    #[arg(long, help = "JSON paging config file path")]
    pub config: Option<String>,
}

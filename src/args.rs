use clap::Parser;

/// Built-in defaults, consulted by both the generated help text and the
/// resolved arguments.
pub mod defaults {
    pub const FROM: &str = "5minutes";
    pub const TO: &str = "now";
    pub const DATASPACE: &str = "developer";
    pub const HOSTPORT: &str = "cloud.humio.com:443";
}

#[derive(Parser, Debug)]
#[command(name = "humio", version, about = "Tool for querying humio through its web API")]
pub struct Args {
    /// The search expression to run.
    pub query: String,

    /// Search from this point in time. Accepts epochs, ISO8601 timestamps
    /// and relative offsets such as 2hours, 3s.
    #[arg(short, long, default_value = defaults::FROM)]
    pub from: String,

    /// Search to this point in time.
    #[arg(short, long, default_value = defaults::TO)]
    pub to: String,

    /// Run the query as a live streaming query.
    #[arg(short, long)]
    pub live: bool,

    /// Print the resolved request before executing it.
    #[arg(short, long)]
    pub verbose: bool,

    /// Print the query as a curl command and exit.
    #[arg(long)]
    pub curl: bool,

    /// Dataspace to query.
    #[arg(long, default_value = defaults::DATASPACE)]
    pub dataspace: String,

    /// The host:port where Humio can be reached.
    #[arg(long, default_value = defaults::HOSTPORT)]
    pub hostport: String,
}

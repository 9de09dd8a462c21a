use clap::{Parser, Subcommand};

/// SharePoint gateway: delegated Graph access for the ticket dashboard
#[derive(Parser)]
#[command(name = "sharepoint-gateway", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the gateway server
    Serve {
        /// Port to bind (defaults to GATEWAY_PORT, then 7071)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Report which identity settings are present; fails if any are missing
    CheckConfig,

    /// Print the claims of a bearer token without verifying it
    DecodeToken {
        /// The raw JWT (a leading "Bearer " is accepted)
        token: String,
    },
}

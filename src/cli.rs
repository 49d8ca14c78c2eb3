// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Global driver selection flags plus one subcommand per operation.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use ocidrv::types::Kind;

#[derive(Parser)]
#[command(name = "ocidrv")]
#[command(about = "Drive Docker, Podman and other container engines through one interface")]
#[command(version)]
pub struct Cli {
    /// Config file (default: ocidrv.yml discovered in the current directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Driver to use, overriding config and OCIDRV_DRIVER
    #[arg(long, global = true)]
    pub driver: Option<String>,

    /// Driver uri, overriding config and OCIDRV_URI
    #[arg(long, global = true)]
    pub uri: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List registered drivers
    Drivers,

    /// Pull an image and print its id
    Pull {
        /// Image reference, e.g. nginx:latest
        reference: String,
    },

    /// Print the backend's description of a resource
    Inspect {
        /// IMAGE, CONTAINER, NETWORK or POD
        kind: Kind,
        /// Resource id or name
        id: String,
    },

    /// Pull an image and run a container from it, step by step
    Provision {
        /// Image reference
        reference: String,

        /// Create a network and attach the container to it
        #[arg(long)]
        network: bool,

        /// Create a namespace and place the container in it
        #[arg(long)]
        namespace: bool,

        /// Create the container without starting it
        #[arg(long)]
        no_start: bool,

        /// Command to run in the container once it is up
        #[arg(long, num_args = 1.., allow_hyphen_values = true, value_name = "CMD")]
        exec: Vec<String>,
    },
}

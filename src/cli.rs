use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PageArgs {
    /// Skip this many results
    #[clap(long, default_value = "0")]
    pub offset: usize,

    /// Page size. Uses `default_page_size` from config.yaml when omitted.
    #[clap(short, long)]
    pub limit: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the search service.
    Serve {
        /// Override `listen` from config.yaml
        #[clap(long)]
        listen: Option<String>,
    },

    /// Find style codes matching a description
    Search {
        /// Free-text description, e.g. "watercolor forest at dusk"
        #[clap(required = true, trailing_var_arg = true)]
        query: Vec<String>,

        #[clap(flatten)]
        page: PageArgs,
    },

    /// Find style codes similar to a known code
    Similar {
        /// A style code present in the index
        code: String,

        #[clap(flatten)]
        page: PageArgs,
    },

    /// Find style codes matching an image file
    Image {
        path: PathBuf,

        #[clap(flatten)]
        page: PageArgs,
    },

    /// Print the tag catalog
    Tags {
        /// Print N random tags instead of the whole catalog
        #[clap(long)]
        sample: Option<usize>,
    },

    /// Build the style index from the metadata table.
    /// Downloads the image model on first use.
    Build {
        /// Don't draw a progress bar
        #[clap(long, default_value = "false")]
        no_progress: bool,
    },
}

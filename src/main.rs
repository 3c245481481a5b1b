use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use env_logger::Env;
use log::info;

use fastscc::algorithms::scc::{ConcurrentFastScc, SccPartition, SccSearch};
use fastscc::algorithms::sequential::SequentialFastScc;
use fastscc::config::{ForestKind, SccConfig};
use fastscc::graph::loader::{load_binary_graph, load_inits, load_text_graph};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum GraphFormat {
    Text,
    Binary,
}

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {

    /// Graph file to search.
    #[arg(short, long)]
    graph: PathBuf,

    /// Layout of the graph file.
    #[arg(long, value_enum, default_value_t = GraphFormat::Text)]
    format: GraphFormat,

    /// File of initial vertex ids, one per line. Without it every vertex is a seed.
    #[arg(short, long)]
    init: Option<PathBuf>,

    /// Number of worker threads, overrides the config file.
    #[arg(short = 'n', long = "threads")]
    num_threads: Option<usize>,

    /// Backing of the tentative DFS forest, overrides the config file.
    #[arg(short, long, value_enum)]
    forest: Option<ForestKind>,

    /// YAML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run the single-threaded search instead of the concurrent one.
    #[arg(short, long)]
    sequential: bool,

    /// Print trivial components too.
    #[arg(short, long)]
    all: bool,

    /// Verify the post-condition of the graph after the concurrent search.
    #[arg(long)]
    check: bool,
}

fn print_partition(partition: &SccPartition, all: bool) {
    for (rep, members) in partition.components() {
        let self_loop = partition.has_self_loop(rep);
        if !all && members.len() < 2 && !self_loop {
            continue;
        }
        let members: Vec<String> = members.iter().map(u64::to_string).collect();
        if self_loop {
            println!("{} (self-loop): {}", rep, members.join(" "));
        } else {
            println!("{}: {}", rep, members.join(" "));
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let args: Args = Args::parse();

    // Step 1. Resolve the configuration, CLI flags win over the YAML file.
    let mut config = match &args.config {
        Some(path) => SccConfig::from_yaml_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => SccConfig::default(),
    };
    if let Some(thread_num) = args.num_threads {
        config.thread_num = thread_num;
    }
    if let Some(forest) = args.forest {
        config.forest = forest;
    }
    config.check_post_condition |= args.check;
    info!("Configuration: {:?}", config);

    // Step 2. Load the graph and its initial vertices.
    let mut builder = match args.format {
        GraphFormat::Text => load_text_graph(&args.graph),
        GraphFormat::Binary => load_binary_graph(&args.graph),
    }
    .with_context(|| format!("loading graph {}", args.graph.display()))?;
    if let Some(init) = &args.init {
        load_inits(init, &mut builder).with_context(|| format!("loading init vertices {}", init.display()))?;
    }
    let graph = builder.build();

    // Step 3. Search, and report the time.
    let start = Instant::now();
    let partition = if args.sequential {
        SequentialFastScc::new().search(&graph)?
    } else {
        ConcurrentFastScc::new(config).search(&graph)?
    };
    let duration = start.elapsed();

    print_partition(&partition, args.all);
    println!(
        "SCC Elapsed Time: {:?} us, {} components, {} non-trivial",
        duration.as_micros(),
        partition.num_components(),
        partition.non_trivial().count()
    );
    Ok(())
}

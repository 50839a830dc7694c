use amrgrid::distribution::KnapsackByCells;
use amrgrid::message::{ChannelCommunicator, Communicator};
use amrgrid::parmparse::Table;
use amrgrid::{Error, ErrorEstimator, Geometry, Hierarchy, ParmParse, RegridResult, TagField};
use clap::Parser;
use log::{info, warn};

#[derive(Debug, Parser)]
#[clap(version = "0.1", about = "Regrid a 2D hierarchy around an expanding ring")]
struct Opts {
    /// Input file in ParmParse format
    #[clap(short = 'i', long)]
    inputs: Option<String>,

    /// Number of in-process ranks that tag and regrid together
    #[clap(short = 'r', long, default_value = "1")]
    ranks: usize,

    /// Number of regrid steps
    #[clap(short = 'n', long, default_value = "4")]
    steps: usize,

    /// Log at debug level
    #[clap(short = 'v', long)]
    verbose: bool,

    /// Parameter overrides, e.g. amr.max_level=3
    overrides: Vec<String>,
}

/**
 * Tags a ring of fixed width around the center of the domain, whose radius
 * grows with time. Each rank tags an interleaved share of the cells.
 */
struct Ring {
    geoms: Vec<Geometry<2>>,
    rank: usize,
    size: usize,
}

impl ErrorEstimator<2> for Ring {
    fn estimate(&self, lev: usize, tags: &mut TagField<2>, time: f64, _ngrow: i64) {
        let geom = &self.geoms[lev];
        let [dx, dy] = geom.cell_size();
        let [x0, y0] = geom.prob_domain().lo();
        let [x1, y1] = geom.prob_domain().hi();
        let (xc, yc) = (0.5 * (x0 + x1), 0.5 * (y0 + y1));
        let radius = 0.1 + 0.05 * time;
        let width = 0.02;
        let space = *tags.space();

        for (n, index) in space.iter().enumerate() {
            if n % self.size != self.rank {
                continue;
            }
            let x = x0 + (index[0] as f64 + 0.5) * dx;
            let y = y0 + (index[1] as f64 + 0.5) * dy;
            let r = ((x - xc).powi(2) + (y - yc).powi(2)).sqrt();

            if (r - radius).abs() < width {
                tags.tag(index)
            }
        }
    }
}

fn read_inputs(opts: &Opts) -> Result<ParmParse, Error> {
    let mut table = match &opts.inputs {
        Some(path) => Table::from_file(path)?,
        None => Table::parse("
            amr.n_cell          = 64 64
            amr.max_level       = 2
            amr.blocking_factor = 8
            amr.max_grid_size   = 32
            amr.n_error_buf     = 2
            amr.grid_eff        = 0.7
            amr.v               = 1
        ")?,
    };
    table.append(Table::from_args(&opts.overrides)?);
    Ok(ParmParse::new(table))
}

fn regrid_all_ranks(hierarchy: &Hierarchy<2>, lbase: usize, time: f64, nranks: usize) -> Result<RegridResult<2>, Error> {
    let geoms: Vec<Geometry<2>> = hierarchy.geoms().into_iter().cloned().collect();

    let results: Vec<Result<RegridResult<2>, Error>> = std::thread::scope(|scope| {
        let handles: Vec<_> = ChannelCommunicator::group(nranks)
            .into_iter()
            .map(|comm| {
                let ring = Ring { geoms: geoms.clone(), rank: comm.rank(), size: comm.size() };
                scope.spawn(move || hierarchy.make_new_grids(lbase, time, &ring, &comm))
            })
            .collect();
        handles.into_iter().map(|h| h.join().expect("rank thread panicked")).collect()
    });

    let mut results = results.into_iter().collect::<Result<Vec<_>, Error>>()?;

    if results.iter().any(|r| r != &results[0]) {
        warn!("ranks disagree on the new grids");
    }
    Ok(results.swap_remove(0))
}

fn run(opts: Opts) -> Result<(), Error> {
    let pp = read_inputs(&opts)?;
    let mut hierarchy = Hierarchy::<2>::from_parm(&pp)?;
    let nranks = opts.ranks.max(1);

    let base = hierarchy.make_base_grids();
    let dmap = amrgrid::distribution::Distribute::distribute(&KnapsackByCells, &base, nranks);
    hierarchy.set_box_array(0, base);
    hierarchy.set_distribution_map(0, dmap);

    for step in 0..opts.steps {
        let time = step as f64;
        let result = regrid_all_ranks(&hierarchy, 0, time, nranks)?;

        if result.is_installed() {
            hierarchy.install(&result, &KnapsackByCells, nranks);
        }
        println!("step {} ({:?}): finest level {}", step, result.phase, hierarchy.finest_level());

        for lev in 0..=hierarchy.finest_level() {
            let grids = hierarchy.box_array(lev);
            let domain_cells = hierarchy.geom(lev).domain().len();
            println!(
                "    level {}: {:>4} grids {:>8} cells ({:.1}% of domain) nested: {}",
                lev,
                grids.len(),
                grids.num_cells(),
                100.0 * grids.num_cells() as f64 / domain_cells as f64,
                hierarchy.is_properly_nested(lev));
        }
        for (lev, stats) in result.stats.iter().enumerate() {
            if let Some(stats) = stats {
                info!("level {} clustered into {} boxes with {} splits", lev, stats.boxes(), stats.splits());
            }
        }
    }

    for (n, (b, rank)) in hierarchy.boxes_with_ranks(hierarchy.finest_level()).enumerate().take(8) {
        info!("finest box {} {:?}..{:?} on rank {}", n, b.start(), b.end(), rank);
    }

    for name in pp.unused_entries() {
        warn!("unused parameter {}", name);
    }
    Ok(())
}

fn main() {
    let opts = Opts::parse();
    let level = if opts.verbose { log::Level::Debug } else { log::Level::Info };

    simple_logger::init_with_level(level).unwrap();

    if let Err(e) = run(opts) {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}

//! Minimal CLI driver
//!
//! Runs the full pipeline on a built-in design and reports component
//! counts and costs before and after each optimization stage:
//!
//!   synth --design counter --bits 8 --iters 20000 --seed 1 \
//!         --pick long-wire --cost mst --leds --emit out.json --sim
//!
//! Exit status is 0 on success and nonzero on any validation or pass
//! failure.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::{env, fs};

use gatesynth::{
    designs, emit, logic_opt, lower, net_opt, place,
    CostModel, InputSchedule, LogicList, PlaceConfig, ProposalStrategy, ValidateFlags,
};

/// Unit costs of the parts actually bought, per variant.
fn component_unit_costs() -> BTreeMap<&'static str, f64> {
    let mut costs = BTreeMap::new();
    costs.insert("Nmos", 0.0062);
    costs.insert("Resistor", 0.0005);
    costs
}

fn parse_flag(args: &[String], key: &str) -> Option<String> {
    let mut it = args.iter();
    while let Some(a) = it.next() {
        if a == key {
            return it.next().cloned();
        }
    }
    None
}

fn has_flag(args: &[String], key: &str) -> bool {
    args.iter().any(|a| a == key)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    let design = parse_flag(&args, "--design").unwrap_or_else(|| "counter".to_owned());
    let bits: usize = parse_flag(&args, "--bits").and_then(|s| s.parse().ok()).unwrap_or(8);
    let steps: usize = parse_flag(&args, "--steps").and_then(|s| s.parse().ok()).unwrap_or(16);
    let iters: usize = parse_flag(&args, "--iters").and_then(|s| s.parse().ok()).unwrap_or(20_000);
    let seed: u64 = parse_flag(&args, "--seed").and_then(|s| s.parse().ok()).unwrap_or(0);
    let temperature: f64 =
        parse_flag(&args, "--temp").and_then(|s| s.parse().ok()).unwrap_or(0.0);
    let strategy = match parse_flag(&args, "--pick").as_deref() {
        Some("long-wire") => ProposalStrategy::LongWireBiased,
        _ => ProposalStrategy::UniformRandom,
    };
    let cost_model = match parse_flag(&args, "--cost").as_deref() {
        Some("mst" | "spanning-tree") => CostModel::SpanningTree,
        _ => CostModel::HalfPerimeter,
    };

    // --- Build ---
    let mut logic = LogicList::new();
    match design.as_str() {
        "counter" => {
            designs::build_counter(&mut logic, bits);
        }
        "shifter" => {
            designs::build_shifter(&mut logic);
        }
        "serial-adder" => {
            designs::build_serial_adder(&mut logic);
        }
        other => {
            return Err(anyhow::anyhow!(
                "unknown design `{other}` (available: counter, shifter, serial-adder)"
            ));
        }
    }
    logic
        .validate(ValidateFlags::all())
        .map_err(|e| anyhow::anyhow!("design is structurally invalid: {e}"))?;
    eprintln!(
        "built `{design}`: {} signals, {} LUTs, {} FFs",
        logic.live_signal_count(),
        logic.luts.len(),
        logic.ffs.len()
    );

    // --- Optimize logic ---
    logic_opt::optimize(&mut logic).map_err(|e| anyhow::anyhow!("logic optimizer: {e}"))?;
    logic
        .validate(ValidateFlags::default())
        .map_err(|e| anyhow::anyhow!("optimizer broke an invariant: {e}"))?;
    eprintln!(
        "optimized: {} signals, {} LUTs, {} FFs",
        logic.live_signal_count(),
        logic.luts.len(),
        logic.ffs.len()
    );

    // --- Optional behavioral check ---
    if has_flag(&args, "--sim") {
        let history = gatesynth::sim::simulate(&logic, &InputSchedule::new(), steps)
            .map_err(|e| anyhow::anyhow!("simulation: {e}"))?;
        eprintln!("{}", history.render(&logic));
    }

    // --- Lower & optimize netlist ---
    let mut lowered =
        lower::lower_design(&logic).map_err(|e| anyhow::anyhow!("lowering: {e}"))?;
    if has_flag(&args, "--leds") {
        let leds = lower::attach_output_leds(&logic, &mut lowered);
        eprintln!("attached {leds} indicator LED(s)");
    }
    let mut net = lowered.net;
    net.validate().map_err(|e| anyhow::anyhow!("lowered netlist: {e}"))?;
    let unit_costs = component_unit_costs();
    eprintln!("lowered: {:?} (cost {:.4})", net.component_counts(), net.total_cost(&unit_costs));

    net_opt::optimize(&mut net);
    net.validate().map_err(|e| anyhow::anyhow!("optimized netlist: {e}"))?;
    eprintln!(
        "net-optimized: {:?} (cost {:.4})",
        net.component_counts(),
        net.total_cost(&unit_costs)
    );

    // --- Place ---
    let config = PlaceConfig { iterations: iters, temperature, seed, strategy, cost_model };
    let grid = place::place(&net, &config).map_err(|e| anyhow::anyhow!("placement: {e}"))?;
    eprintln!(
        "placed {} components on a {size}x{size} grid, wirelength {cost}",
        grid.component_count(),
        size = grid.size(),
        cost = grid.total_cost(),
    );

    // --- Optional emission ---
    if let Some(path) = parse_flag(&args, "--emit") {
        let doc = emit::document(&net, &grid);
        let file = fs::File::create(&path)
            .map_err(|e| anyhow::anyhow!("create {path}: {e}"))?;
        emit::write_json(&doc, file).map_err(|e| anyhow::anyhow!("write {path}: {e}"))?;
        eprintln!("wrote {path}");
    }

    Ok(())
}

//! `cpn` 命令行入口: 装载网描述文件, 支持结构摘要、矩阵打印、随机模拟
//! 与有界可达性探索. 日志经 `CPN_LOG` 环境变量开启.
use anyhow::{Context, Result, bail};
use clap::{Arg, ArgMatches, Command};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use cpnet::net::io;
use cpnet::net::{Enabling, ExploreOptions, Marking, Net, TokenId, explore};

fn net_arg() -> Arg {
    Arg::new("net")
        .value_name("FILE")
        .required(true)
        .help("Net description file (.json or .ron)")
}

fn make_parser() -> Command {
    Command::new("cpn")
        .version("v0.1.0")
        .about("Colored Petri net structural matrices and firing semantics")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("info")
                .about("Summarize the net and run connectivity diagnostics")
                .arg(net_arg()),
        )
        .subcommand(
            Command::new("matrices")
                .about("Print the four structural matrices for one token color")
                .arg(net_arg())
                .arg(
                    Arg::new("token")
                        .short('t')
                        .long("token")
                        .value_name("NAME")
                        .help("Token color name; defaults to the first enabled color"),
                ),
        )
        .subcommand(
            Command::new("simulate")
                .about("Random walk over enabled transitions from the initial marking")
                .arg(net_arg())
                .arg(
                    Arg::new("steps")
                        .short('n')
                        .long("steps")
                        .default_value("10")
                        .value_parser(clap::value_parser!(u64))
                        .help("Maximum number of firings"),
                )
                .arg(
                    Arg::new("seed")
                        .short('s')
                        .long("seed")
                        .value_parser(clap::value_parser!(u64))
                        .help("Seed for a reproducible walk"),
                ),
        )
        .subcommand(
            Command::new("reach")
                .about("Bounded breadth-first reachability exploration")
                .arg(net_arg())
                .arg(
                    Arg::new("max-states")
                        .long("max-states")
                        .default_value("10000")
                        .value_parser(clap::value_parser!(usize))
                        .help("State cap; exploration truncates instead of failing"),
                ),
        )
}

fn load(matches: &ArgMatches) -> Result<(Net, Marking)> {
    let path = matches.get_one::<String>("net").unwrap();
    let description =
        io::read_description(path).with_context(|| format!("reading net description {path}"))?;
    let assembled = description
        .assemble()
        .with_context(|| format!("assembling net from {path}"))?;
    Ok(assembled)
}

fn resolve_token(net: &Net, matches: &ArgMatches) -> Result<TokenId> {
    if let Some(name) = matches.get_one::<String>("token") {
        return net
            .tokens()
            .lookup(name)
            .with_context(|| format!("no token color named {name:?}"));
    }
    match net.tokens().enabled_tokens().first() {
        Some(token) => Ok(*token),
        None => bail!("net declares no enabled token color"),
    }
}

fn info(matches: &ArgMatches) -> Result<()> {
    let (net, marking) = load(matches)?;

    println!("places:      {}", net.topology().places_len());
    println!("transitions: {}", net.topology().transitions_len());
    println!("arcs:        {}", net.topology().arcs_len());

    for (id, color) in net.tokens().iter() {
        println!(
            "token {:?} enabled={} locked_places={}",
            color.name(),
            color.is_enabled(),
            color.lock_count()
        );
        let total: u64 = marking
            .iter()
            .filter(|(_, token, _)| *token == id)
            .map(|(_, _, count)| count)
            .sum();
        println!("  initial tokens: {total}");
    }

    let report = net.diagnose();
    if report.has_issues() {
        for (_, name) in &report.isolated_places {
            println!("warning: place {name:?} has no arcs");
        }
        for (_, name) in &report.isolated_transitions {
            println!("warning: transition {name:?} has no arcs");
        }
        for warning in &report.warnings {
            println!("warning: {warning}");
        }
    } else {
        println!("no structural issues");
    }
    Ok(())
}

fn matrices(matches: &ArgMatches) -> Result<()> {
    let (mut net, _) = load(matches)?;
    let token = resolve_token(&net, matches)?;
    let name = net.tokens().get(token)?.name().to_string();
    let set = net.matrix_set(token)?.clone();

    let place_names: Vec<String> = set
        .place_order()
        .iter()
        .map(|id| {
            net.topology()
                .places()
                .find(|(pid, _)| pid == id)
                .map(|(_, place)| place.name.clone())
                .unwrap_or_else(|| format!("{id:?}"))
        })
        .collect();
    let transition_names: Vec<String> = set
        .transition_order()
        .iter()
        .map(|id| {
            net.topology()
                .transitions()
                .find(|(tid, _)| tid == id)
                .map(|(_, transition)| transition.name.clone())
                .unwrap_or_else(|| format!("{id:?}"))
        })
        .collect();

    println!("matrices for token color {name:?}");
    print_matrix("forward", &place_names, &transition_names, |p, t| {
        set.forward().get(p, t).to_string()
    });
    print_matrix("backward", &place_names, &transition_names, |p, t| {
        set.backward().get(p, t).to_string()
    });
    print_matrix("net", &place_names, &transition_names, |p, t| {
        set.net().get(p, t).to_string()
    });
    print_matrix("inhibitor", &place_names, &transition_names, |p, t| {
        if set.inhibitor().get(p, t) { "1" } else { "0" }.to_string()
    });
    Ok(())
}

fn print_matrix<F>(title: &str, places: &[String], transitions: &[String], cell: F)
where
    F: Fn(usize, usize) -> String,
{
    println!("{title}:");
    println!("  {:>12} {}", "", transitions.join(" "));
    for (p, place) in places.iter().enumerate() {
        let row: Vec<String> = (0..transitions.len()).map(|t| cell(p, t)).collect();
        println!("  {place:>12} {}", row.join(" "));
    }
}

fn simulate(matches: &ArgMatches) -> Result<()> {
    let (mut net, mut marking) = load(matches)?;
    let steps = *matches.get_one::<u64>("steps").unwrap();
    let mut rng = match matches.get_one::<u64>("seed") {
        Some(seed) => StdRng::seed_from_u64(*seed),
        None => StdRng::from_os_rng(),
    };

    let transitions: Vec<_> = net
        .topology()
        .transitions()
        .map(|(id, transition)| (id, transition.name.clone()))
        .collect();

    for step in 0..steps {
        let mut enabled = Vec::new();
        for (id, name) in &transitions {
            if let Enabling::Enabled { degree } = net.enabling_degree(&marking, *id)? {
                enabled.push((*id, name.clone(), degree));
            }
        }
        if enabled.is_empty() {
            println!("step {step}: deadlock, no transition enabled");
            return Ok(());
        }

        let (id, name, max_degree) = enabled[rng.random_range(0..enabled.len())].clone();
        let degree = rng.random_range(1..=max_degree);
        net.fire(&mut marking, id, degree)?;
        println!("step {step}: fired {name:?} at degree {degree}");
    }

    println!("stopped after {steps} steps");
    Ok(())
}

fn reach(matches: &ArgMatches) -> Result<()> {
    let (mut net, marking) = load(matches)?;
    let options = ExploreOptions {
        max_states: *matches.get_one::<usize>("max-states").unwrap(),
    };

    let graph = explore(&mut net, &marking, options)?;
    println!("states:    {}", graph.state_count());
    println!("edges:     {}", graph.edges.len());
    println!("deadlocks: {}", graph.deadlocks.len());
    if graph.truncated {
        println!("truncated at {} states", options.max_states);
    }
    Ok(())
}

fn main() -> Result<()> {
    if std::env::var("CPN_LOG").is_ok() {
        let env = env_logger::Env::new()
            .filter("CPN_LOG")
            .write_style("CPN_LOG_STYLE");
        env_logger::init_from_env(env);
    }

    let matches = make_parser().get_matches();
    match matches.subcommand() {
        Some(("info", sub)) => info(sub),
        Some(("matrices", sub)) => matrices(sub),
        Some(("simulate", sub)) => simulate(sub),
        Some(("reach", sub)) => reach(sub),
        _ => unreachable!("subcommand is required"),
    }
}

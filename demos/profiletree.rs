use jitprof_data::jitlog::decode_jitlog;
use jitprof_data::profile::decode_profile;
use jitprof_data::{AddressSpace, StackTag, Stats};
use prost::Message;

fn main() {
    let mut args = std::env::args().skip(1);
    let mut profile_path = None;
    let mut jitlog_path = None;
    let mut pprof_path = None;
    let mut virtual_only = false;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--jitlog" => jitlog_path = args.next(),
            "--pprof" => pprof_path = args.next(),
            "--virtual" => virtual_only = true,
            _ => profile_path = Some(arg),
        }
    }
    let Some(profile_path) = profile_path else {
        eprintln!("Usage: profiletree <profile> [--jitlog <jitlog>] [--virtual] [--pprof <out.pb>]");
        std::process::exit(1);
    };

    let profile = decode_profile(std::fs::File::open(&profile_path).unwrap()).unwrap();
    if let Some(fault) = profile.fault() {
        eprintln!("Profile decoding stopped early: {fault}");
    }
    let forest = jitlog_path.map(|path| decode_jitlog(std::fs::File::open(path).unwrap()).unwrap());
    let space = AddressSpace::from_profile(&profile, Vec::new(), forest.as_ref());
    let stats = Stats::new(&profile, &space);

    for (key, value) in profile.meta() {
        println!("{key}: {value}");
    }
    let total = stats.total_ticks();
    println!("{} samples, {total} ticks, {} while compiling", stats.samples().len(), stats.jitting_ticks());
    let totals = stats.tag_totals();
    for tag in StackTag::ALL {
        let ticks = totals.get(&tag).copied().unwrap_or(0);
        if ticks != 0 {
            println!("  {:>8}: {:5.1}%", tag.name(), percent(ticks, total));
        }
    }
    println!();

    println!("Top functions:");
    for (name, ticks) in stats.top_functions(10) {
        println!("  {:5.1}% {name}", percent(ticks, total));
    }
    println!();

    let tree = if virtual_only {
        stats.virtual_call_tree()
    } else {
        stats.call_tree()
    };
    tree.walk(|node, depth| {
        if depth == 0 {
            return;
        }
        let cumulative = node.total_cumulative();
        if percent(cumulative, total) < 1.0 {
            return;
        }
        println!(
            "{:indent$}{:5.1}% {:5.1}% {}",
            "",
            percent(cumulative, total),
            percent(node.total_self(), total),
            node.name(),
            indent = (depth - 1) * 2
        );
    });

    if let Some(path) = pprof_path {
        std::fs::write(&path, stats.to_pprof().encode_to_vec()).unwrap();
        eprintln!("Wrote {path}");
    }
}

fn percent(ticks: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ticks as f64 * 100.0 / total as f64
}

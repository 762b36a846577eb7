use jitprof_data::jitlog::{decode_jitlog, Operation, SourceProvider, Trace, TraceForest};
use serde::{Serialize, Serializer};
use std::collections::HashMap;

fn serialize_address_as_hex<S>(addr: &u64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("0x{:x}", addr))
}

fn serialize_optional_address_as_hex<S>(addr: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match addr {
        Some(addr) => serialize_address_as_hex(addr, serializer),
        None => serializer.serialize_none(),
    }
}

/// Reads source files from disk, once per file.
#[derive(Default)]
struct SourceFiles {
    contents: HashMap<String, Option<String>>,
}

impl SourceProvider for SourceFiles {
    fn source_line(&mut self, file: &str, line: u16) -> Option<String> {
        let contents = self
            .contents
            .entry(file.to_owned())
            .or_insert_with(|| std::fs::read_to_string(file).ok());
        let index = usize::from(line).checked_sub(1)?;
        contents.as_ref()?.lines().nth(index).map(str::to_owned)
    }
}

#[derive(Debug, Serialize)]
struct StageInfo {
    name: &'static str,
    operations: Vec<String>,
    machine_code: Vec<CodeInfo>,
}

#[derive(Debug, Serialize)]
struct CodeInfo {
    index: usize,
    offset: u16,
    bytes: String,
}

#[derive(Debug, Serialize)]
struct TraceInfo {
    #[serde(serialize_with = "serialize_address_as_hex")]
    id: u64,
    kind: &'static str,
    jit_driver: Option<String>,
    #[serde(serialize_with = "serialize_optional_address_as_hex")]
    start: Option<u64>,
    #[serde(serialize_with = "serialize_optional_address_as_hex")]
    end: Option<u64>,
    #[serde(serialize_with = "serialize_optional_address_as_hex")]
    parent: Option<u64>,
    enter_count: u64,
    aborted: bool,
    stages: Vec<StageInfo>,
    bridges: Vec<String>,
}

#[derive(Debug, Serialize)]
struct SourceLineInfo {
    line: u16,
    indent: u8,
    text: String,
}

#[derive(Debug, Serialize)]
struct OutputData {
    version: u16,
    machine: String,
    traces: Vec<TraceInfo>,
    source: HashMap<String, Vec<SourceLineInfo>>,
    warnings: Vec<String>,
    fault: Option<String>,
}

fn trace_info(forest: &TraceForest, trace: &Trace) -> TraceInfo {
    let stages = trace
        .stages()
        .map(|stage| StageInfo {
            name: stage.kind().name(),
            operations: stage.operations().map(|op| op.to_string()).collect(),
            machine_code: stage
                .operations()
                .filter_map(|op| match op {
                    Operation::Flat(op) => Some(op),
                    Operation::MergePoint(_) => None,
                })
                .filter_map(|op| {
                    let dump = op.core_dump.as_ref()?;
                    Some(CodeInfo {
                        index: op.index,
                        offset: dump.offset,
                        bytes: dump.bytes.iter().map(|b| format!("{b:02x}")).collect(),
                    })
                })
                .collect(),
        })
        .collect();
    TraceInfo {
        id: trace.unique_id(),
        kind: trace.kind().name(),
        jit_driver: trace.jit_driver().map(str::to_owned),
        start: trace.addrs().map(|(start, _)| start),
        end: trace.addrs().map(|(_, end)| end),
        parent: forest.parent(trace).map(Trace::unique_id),
        enter_count: trace.enter_count(),
        aborted: trace.is_aborted(),
        stages,
        bridges: trace.bridges().map(|id| format!("0x{id:x}")).collect(),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: {} <jitlog_file>", args[0]);
        std::process::exit(1);
    }

    let file = std::fs::File::open(&args[1]).unwrap_or_else(|e| {
        eprintln!("Failed to open {}: {}", args[1], e);
        std::process::exit(1);
    });
    let mut forest = decode_jitlog(file).unwrap_or_else(|e| {
        eprintln!("Failed to decode {}: {}", args[1], e);
        std::process::exit(1);
    });

    // Fill in the lines which the log itself did not carry.
    let added = forest.extract_source_code_lines(&mut SourceFiles::default());
    eprintln!("Read {added} source lines from disk");

    let source = forest
        .source_cache()
        .files()
        .map(|(file, lines)| {
            let lines = lines
                .iter()
                .map(|(&line, source)| SourceLineInfo {
                    line,
                    indent: source.indent,
                    text: source.text.clone(),
                })
                .collect();
            (file.to_owned(), lines)
        })
        .collect();

    let output_data = OutputData {
        version: forest.version(),
        machine: forest.header().machine.clone(),
        traces: forest.traces().map(|trace| trace_info(&forest, trace)).collect(),
        source,
        warnings: forest.anomalies().iter().map(|a| a.to_string()).collect(),
        fault: forest.fault().map(|fault| fault.to_string()),
    };

    match serde_json::to_string_pretty(&output_data) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Failed to serialize to JSON: {}", e);
            std::process::exit(1);
        }
    }
}

use jitprof_data::jitlog::{decode_jitlog, OpRef, Operation, TraceForest};
use yaxpeax_arch::{Arch, Decoder, Reader, U8Reader};

fn main() {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "pypy.jitlog".into());
    let file = std::fs::File::open(&path).unwrap_or_else(|e| {
        eprintln!("Failed to open {path}: {e}");
        std::process::exit(1);
    });
    let forest = decode_jitlog(file).unwrap();
    let header = forest.header();
    println!(
        "jitlog version {}, {:?} words, machine {}",
        header.version, header.word_size, header.machine
    );
    println!();

    for trace in forest.traces() {
        print!("{} {:#x}", trace.kind().name(), trace.unique_id());
        if let Some(jd) = trace.jit_driver() {
            print!(" ({jd})");
        }
        if let Some((start, end)) = trace.addrs() {
            print!(" at {start:#x}..{end:#x}");
        }
        if let Some(parent) = forest.parent(trace) {
            print!(", attached to {:#x}", parent.unique_id());
        }
        if trace.is_aborted() {
            print!(", aborted");
        }
        println!();
        println!("  entered {} times", trace.enter_count());
        if !trace.input_args().is_empty() {
            println!("  inputs: {}", trace.input_args().join(", "));
        }

        for stage in trace.stages() {
            println!("  {}:", stage.kind().name());
            for operation in stage.operations() {
                println!("    {operation}");
                let Operation::Flat(op) = operation else {
                    continue;
                };
                let op_ref = OpRef {
                    stage: stage.kind(),
                    index: op.index,
                };
                let count = trace.point_counter(op_ref);
                if count != 0 {
                    println!("      ^ hit {count} times");
                }
                if let Some(dump) = forest.core_dump_at(trace.unique_id(), op_ref, forest.time()) {
                    print_disassembly(&forest, &dump);
                }
            }
        }
        for link in trace.links_out() {
            println!("  -> {:#x}", link.target.trace);
        }
        println!();
    }

    for anomaly in forest.anomalies() {
        println!("warning: {anomaly}");
    }
    if let Some(fault) = forest.fault() {
        println!("stopped early: {fault}");
    }
}

fn print_disassembly(forest: &TraceForest, bytes: &[u8]) {
    let machine = forest.header().machine.as_str();
    let lines = match machine {
        "x86_64" | "x86-64" | "amd64" => disassemble::<yaxpeax_x86::amd64::Arch>(bytes),
        "x86" | "i386" | "i686" => disassemble::<yaxpeax_x86::protected_mode::Arch>(bytes),
        _ => {
            println!("      <{} bytes of {machine} code>", bytes.len());
            return;
        }
    };
    for (offset, text) in lines {
        println!("      {offset:4x}: {text}");
    }
}

trait InstructionDecoding: Arch {
    type InstructionDisplay<'a>: std::fmt::Display;
    fn make_decoder() -> Self::Decoder;
    fn inst_display(inst: &Self::Instruction) -> Self::InstructionDisplay<'_>;
}

impl InstructionDecoding for yaxpeax_x86::amd64::Arch {
    type InstructionDisplay<'a> = yaxpeax_x86::amd64::InstructionDisplayer<'a>;

    fn make_decoder() -> Self::Decoder {
        yaxpeax_x86::amd64::InstDecoder::default()
    }

    fn inst_display(inst: &Self::Instruction) -> Self::InstructionDisplay<'_> {
        inst.display_with(yaxpeax_x86::amd64::DisplayStyle::Intel)
    }
}

impl InstructionDecoding for yaxpeax_x86::protected_mode::Arch {
    type InstructionDisplay<'a> = &'a Self::Instruction;

    fn make_decoder() -> Self::Decoder {
        yaxpeax_x86::protected_mode::InstDecoder::default()
    }

    fn inst_display(inst: &Self::Instruction) -> Self::InstructionDisplay<'_> {
        inst
    }
}

/// Decode as many instructions as possible. Undecodable bytes are shown one
/// at a time.
fn disassemble<'a, A: InstructionDecoding>(bytes: &'a [u8]) -> Vec<(usize, String)>
where
    u64: From<A::Address>,
    U8Reader<'a>: Reader<A::Address, A::Word>,
{
    let decoder = A::make_decoder();
    let mut reader = U8Reader::new(bytes);
    let mut offset = 0;
    let mut lines = Vec::new();
    loop {
        let before = u64::from(reader.total_offset()) as usize;
        match decoder.decode(&mut reader) {
            Ok(inst) => {
                lines.push((offset, A::inst_display(&inst).to_string()));
                let after = u64::from(reader.total_offset()) as usize;
                offset += after - before;
            }
            Err(e) => {
                use yaxpeax_arch::DecodeError;
                if e.data_exhausted() {
                    break;
                }
                let Some(byte) = bytes.get(offset) else {
                    break;
                };
                lines.push((offset, format!(".byte {byte:#04x} # {e}")));
                offset += 1;
                let Some(rest) = bytes.get(offset..) else {
                    break;
                };
                reader = U8Reader::new(rest);
            }
        }
    }
    lines
}

use std::io::{stdin, stdout, Write};

use anyhow::Result;
use core_sim::{
    common::{EventKind, ExecuteMode, RunStep, SimulationOption},
    sim::{BreakReason, ControlFlow, Simulator},
    trace::{TraceError, TraceRecord},
};

#[cfg(feature = "stat")]
use terminal_size::terminal_size;

peg::parser!(grammar command() for str {
    rule usize() -> usize
        = n:$(quiet!{['0'..='9']+}) {? n.parse().or(Err("usize")) }
        / expected!("usize")
    rule radix() -> usize
        = quiet!{"0" ['x' | 'X']} n:$(quiet!{['0'..='9'|'a'..='f'|'A'..='F']+})
        {? usize::from_str_radix(n, 16).or(Err("hexadecimal")) }
    rule number() -> usize
        = radix() / usize()
    rule bp() = "bp" / "breakpoint"
    rule rm() = "rm" / "remove" / "-="
    rule event() -> EventKind
        = "hit" { EventKind::Hit }
        / "miss" { EventKind::Miss }
        / "eviction" "s"? { EventKind::Eviction }
        / "all" { EventKind::Hit | EventKind::Miss | EventKind::Eviction }
        / expected!("hit, miss, eviction or all")
    rule events() -> EventKind
        = es:(event() ++ ((_ "|" _) / __)) {
            es.into_iter().fold(EventKind::none(), |acc, e| acc | e)
        }
    rule dyn_command() -> ExecuteMode
        = "run" { ExecuteMode::Run }
        / "step" step:(__ n:number() { n })? { ExecuteMode::RunStep(RunStep::new(step)) }
    rule static_command() -> StaticCommand
        = "trace" __ "off" { StaticCommand::UpdateWhetherTrace(false) }
        / "trace" (__ "on")? { StaticCommand::UpdateWhetherTrace(true) }
        / bp() __ rm() __ index:number() { StaticCommand::RemoveBp(index) }
        / bp() __ index:number() { StaticCommand::AddBp(index) }
        / "watch" __ set:number() kind:(__ e:events() { e })? {
            StaticCommand::Watch(set, kind.unwrap_or(EventKind::Miss | EventKind::Eviction))
        }
        / "unwatch" __ set:number() { StaticCommand::Unwatch(set) }
        / "show" __ sk:show_kind() { StaticCommand::Show(sk) }
    rule show_kind() -> ShowKind
        = "set" __ index:number() { ShowKind::Set(index) }
        / "stat" "s"? { ShowKind::Stat }
        / bp() { ShowKind::AllBp }
        / ("watchings" / "watch" "es"?) { ShowKind::Watchings }
        / "record" { ShowKind::Record }
        / "trace" { ShowKind::IsTraceEnabled }
    pub(crate) rule parse_command() -> Command
        = _ s:static_command() _ { Command::Static(s) }
        / _ "exit" _ { Command::Exit }
        / _ d:dyn_command()? _ { Command::Dynamic(d) }
        / expected!("command")

    rule ws() = quiet!{[' ' | '\t' | '\r' | '\n']}
        / expected!("whitespace")
    rule _() = ws()*
    rule __() = ws()+
});

pub(crate) enum Command {
    Dynamic(Option<ExecuteMode>),
    Static(StaticCommand),
    Exit,
}

pub(crate) enum StaticCommand {
    UpdateWhetherTrace(bool),
    Show(ShowKind),
    AddBp(usize),
    RemoveBp(usize),
    Watch(usize, EventKind),
    Unwatch(usize),
}

pub(crate) enum ShowKind {
    Set(usize),
    Stat,
    AllBp,
    Watchings,
    Record,
    IsTraceEnabled,
}

#[cfg(feature = "stat")]
fn get_terminal_width() -> Option<u16> {
    terminal_size().map(|(w, _)| w.0.saturating_sub(20))
}

fn show(sim: &Simulator, opt: &SimulationOption, kind: ShowKind) {
    match kind {
        ShowKind::Set(index) => match sim.cache().set_view(index) {
            Some(view) => println!("{view}"),
            None => println!(
                "set {index} out of range (cache has {} sets)",
                sim.cache().num_sets()
            ),
        },
        ShowKind::Stat => {
            println!("{}", sim.counters());
            #[cfg(feature = "stat")]
            {
                let width = get_terminal_width().unwrap_or(60) as usize;
                println!("{}", sim.collect_stat().view(width));
            }
        }
        ShowKind::AllBp => {
            if opt.breakpoints.is_empty() {
                println!("no breakpoints set.");
            } else {
                println!(
                    "breakpoints: [{}]",
                    opt.breakpoints
                        .iter()
                        .map(|b| format!("#{b}"))
                        .collect::<Vec<_>>()
                        .join(", ")
                );
            }
        }
        ShowKind::Watchings => {
            if opt.watchings.is_empty() {
                println!("nothing to watch.");
            } else {
                println!("watching these sets:");
                for (set, kind) in &opt.watchings {
                    println!("\tset {set}: {kind}");
                }
            }
        }
        ShowKind::Record => {
            println!("next record #{}, {}", sim.record_index(), sim.counters());
        }
        ShowKind::IsTraceEnabled => {
            println!(
                "trace {}",
                if opt.do_trace { "enabled" } else { "disabled" }
            );
        }
    }
}

pub fn execute_interactive<I>(sim: &mut Simulator, mut records: I) -> Result<()>
where
    I: Iterator<Item = Result<TraceRecord, TraceError>>,
{
    let mut opt = SimulationOption::default();
    println!("entering interactive.");
    'interactive: loop {
        let mut pending = None;
        let update_mode = 'input: loop {
            if let Some(kind) = pending.take() {
                show(sim, &opt, kind);
            }
            // prompt string
            match &opt.mode {
                ExecuteMode::Run => print!("run "),
                ExecuteMode::RunStep(n) => print!("step {} ", n.get_step()),
            }
            if opt.do_trace {
                print!("[trace] ");
            }
            print!("#{} > ", sim.record_index());
            stdout().flush()?;
            let mut line = String::new();
            if stdin().read_line(&mut line)? == 0 {
                break 'interactive;
            }
            let parsed = match command::parse_command(&line) {
                Ok(p) => p,
                Err(e) => {
                    println!("parse error: expected {}", e.expected);
                    continue;
                }
            };
            match parsed {
                Command::Dynamic(d) => {
                    break 'input d;
                }
                Command::Static(s) => {
                    match s {
                        StaticCommand::Show(s) => pending = Some(s),
                        StaticCommand::UpdateWhetherTrace(b) => {
                            opt.do_trace = b;
                            pending = Some(ShowKind::IsTraceEnabled);
                        }
                        StaticCommand::AddBp(index) => {
                            opt.breakpoints.insert(index);
                            pending = Some(ShowKind::AllBp);
                        }
                        StaticCommand::RemoveBp(index) => {
                            opt.breakpoints.remove(&index);
                            pending = Some(ShowKind::AllBp);
                        }
                        StaticCommand::Watch(set, kind) => {
                            if set >= sim.cache().num_sets() {
                                println!("warning: set {set} does not exist");
                            }
                            *opt.watchings.entry(set).or_insert(EventKind::none()) |= kind;
                            pending = Some(ShowKind::Watchings);
                        }
                        StaticCommand::Unwatch(set) => {
                            opt.watchings.remove(&set);
                            pending = Some(ShowKind::Watchings);
                        }
                    };
                    continue 'input;
                }
                Command::Exit => {
                    break 'interactive;
                }
            }
        };
        if let Some(mode) = update_mode {
            println!("mode: {mode}");
            opt.mode = mode;
        }
        let do_trace = opt.do_trace;
        let flow = sim.run(&mut records, &opt, |index, record, outcome| {
            if do_trace && !outcome.is_empty() {
                println!("#{index} {record} {outcome}");
            }
        })?;
        match flow {
            ControlFlow::Break(reason) => match reason {
                BreakReason::StepEnded => (),
                BreakReason::BreakPoint(index) => {
                    println!("reached breakpoint #{index}")
                }
                BreakReason::Watch {
                    record_index,
                    set_index,
                    event,
                } => {
                    println!("detect {event} in set {set_index} at record #{record_index}");
                    show(sim, &opt, ShowKind::Set(set_index));
                }
            },
            ControlFlow::Exit => {
                println!("trace exhausted after {} records", sim.record_index());
                break 'interactive;
            }
        }
    }
    println!("exiting interactive.");
    Ok(())
}

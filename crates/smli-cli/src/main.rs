use clap::Parser;
use serde::{Deserialize, Serialize};
use smli_ast::ast::Decl;
use smli_interp::{IdentifierStatus, Interpreter, InterpreterOptions, Warning, WarningKind};
use std::io::Read;
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "smli", version, about = "Elaborate and evaluate JSON-encoded smli core declarations")]
struct Opt {
    /// Program: one declaration or an array of top-level declarations (JSON); `-` reads stdin
    input: PathBuf,

    /// Interpreter options as JSON; flags below override it
    #[arg(long = "options")]
    options: Option<PathBuf>,

    /// Abort evaluation after this many frames
    #[arg(long = "max-steps")]
    max_steps: Option<u64>,

    /// Do not report non-exhaustive or redundant matches
    #[arg(long = "no-exhaustiveness", default_value_t = false)]
    no_exhaustiveness: bool,

    /// Refinement passes for recursive bindings
    #[arg(long = "max-refinement-passes")]
    max_refinement_passes: Option<usize>,

    /// Nesting depth of recursive groups beyond which the circularity check is skipped
    #[arg(long = "circularity-check-depth")]
    circularity_check_depth: Option<usize>,

    /// Output format: text|json
    #[arg(long = "format", default_value = "text")]
    format: String,

    /// Log elaboration and evaluation (overridden by RUST_LOG)
    #[arg(short = 'v', long = "verbose", default_value_t = false)]
    verbose: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Program {
    Many(Vec<Decl>),
    One(Decl),
}

#[derive(Serialize)]
struct Binding {
    name: String,
    value: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Serialize)]
struct DeclOut {
    bindings: Vec<Binding>,
    raised: Option<String>,
    warnings: Vec<Warning>,
}

fn load_options(opt: &Opt) -> Result<InterpreterOptions, Box<dyn std::error::Error>> {
    let mut options = match &opt.options {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => InterpreterOptions::default(),
    };
    if opt.max_steps.is_some() {
        options.max_steps = opt.max_steps;
    }
    if opt.no_exhaustiveness {
        options.exhaustiveness_warnings = false;
    }
    if let Some(n) = opt.max_refinement_passes {
        options.max_refinement_passes = n;
    }
    if let Some(n) = opt.circularity_check_depth {
        options.circularity_check_depth = n;
    }
    Ok(options)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let opt = Opt::parse();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if opt.verbose { "debug" } else { "error" }));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let source = if opt.input.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(&opt.input)?
    };
    let decls = match serde_json::from_str::<Program>(&source)? {
        Program::Many(decls) => decls,
        Program::One(decl) => vec![decl],
    };

    let mut interp = Interpreter::with_options(load_options(&opt)?);
    for decl in decls {
        let decl = Rc::new(decl);
        let before = interp.state().clone();
        let evaluation = interp.interpret(&decl).map_err(|e| format!("{e}"))?;
        let delta = interp.state().delta_since(&before);
        let mut names: Vec<&String> = delta
            .statics
            .values
            .iter()
            .filter(|(_, (_, status))| *status == IdentifierStatus::ValueVariable)
            .map(|(name, _)| name)
            .collect();
        names.sort();
        let bindings: Vec<Binding> = names
            .into_iter()
            .map(|name| Binding {
                name: name.clone(),
                value: interp.value(name).map(|v| interp.show(v)).unwrap_or_default(),
                ty: interp.static_type(name).unwrap_or_default(),
            })
            .collect();
        let raised = evaluation.raised.as_ref().map(|exn| interp.show(exn));

        if opt.format == "json" {
            let out = DeclOut { bindings, raised, warnings: evaluation.warnings };
            println!("{}", serde_json::to_string(&out)?);
            continue;
        }
        for w in &evaluation.warnings {
            match w.kind {
                WarningKind::Output => print!("{}", w.message),
                _ => eprintln!("warning: {} span=({},{})", w.message, w.span.offset, w.span.len),
            }
        }
        for b in &bindings {
            println!("val {} = {} : {}", b.name, b.value, b.ty);
        }
        if let Some(exn) = raised {
            println!("Uncaught exception: {exn}");
        }
    }
    Ok(())
}

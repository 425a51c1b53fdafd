//! `dexon deps`: prints the dependency state recorded by the last build.

use std::collections::{BTreeMap, BTreeSet};

use dexon_diagnostics::DiagnosticSink;
use dexon_driver::BuildSession;
use dexon_incremental::DependencyState;

use crate::pipeline::{load_project, report};
use crate::{DepsArgs, GlobalArgs, ReportFormat};

/// Runs the `dexon deps` command.
pub fn run(args: &DepsArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let sink = DiagnosticSink::new();
    let session = BuildSession::new(&config, &project_dir, &sink);
    let Some(container) = session.incremental_state() else {
        return Err("no incremental folder is configured in dexon.toml".into());
    };

    let state = match DependencyState::load(&container) {
        Ok(Some(state)) => state,
        Ok(None) => {
            if !global.quiet {
                eprintln!("no build state recorded yet");
            }
            return Ok(0);
        }
        Err(err) => {
            sink.emit(err.to_diagnostic());
            return Ok(report(&sink, args.format, global));
        }
    };

    let edges = select(&state, &args.types, args.reverse);
    match args.format {
        ReportFormat::Text => print!("{}", render_text(&state, &edges, args)),
        ReportFormat::Json => {
            let key = if args.reverse { "dependents" } else { "dependencies" };
            let mut value = serde_json::json!({ key: edges });
            if args.files {
                value["files"] = serde_json::json!(files_of(&state));
            }
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(0)
}

/// The edges to print: for each selected type, what it depends on, or
/// with `reverse` what depends on it. No selection means every type.
fn select(
    state: &DependencyState,
    types: &[String],
    reverse: bool,
) -> BTreeMap<String, BTreeSet<String>> {
    let lookup = |ty: &str| {
        let targets = if reverse {
            state.types.recompile_dependencies().get(ty)
        } else {
            state.types.dependencies_of(ty)
        };
        targets.cloned().unwrap_or_default()
    };
    let selected: Vec<&str> = if types.is_empty() {
        state.types.types().collect()
    } else {
        types.iter().map(String::as_str).collect()
    };
    selected
        .into_iter()
        .map(|ty| (ty.to_string(), lookup(ty)))
        .collect()
}

fn files_of(state: &DependencyState) -> BTreeMap<&str, Vec<&str>> {
    state
        .files
        .compiled_files()
        .map(|file| (file, state.files.type_names(file).collect()))
        .collect()
}

fn render_text(
    state: &DependencyState,
    edges: &BTreeMap<String, BTreeSet<String>>,
    args: &DepsArgs,
) -> String {
    let arrow = if args.reverse { "<-" } else { "->" };
    let mut out = String::new();
    for (ty, targets) in edges {
        match state.files.java_file_name(ty) {
            Some(file) => out.push_str(&format!("{ty}  ({file})\n")),
            None => out.push_str(&format!("{ty}\n")),
        }
        for target in targets {
            out.push_str(&format!("  {arrow} {target}\n"));
        }
    }
    if args.files {
        for (file, types) in files_of(state) {
            out.push_str(&format!("{file}: {}\n", types.join(", ")));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> DependencyState {
        let mut state = DependencyState::default();
        state.files.add_file("A.java", ["LA;", "LA$1;"]);
        state.files.add_file("B.java", ["LB;"]);
        state.types.add("LA;", ["LB;", "Ljava/lang/Object;"]);
        state.types.add("LA$1;", ["LA;"]);
        state.types.add("LB;", ["Ljava/lang/Object;"]);
        state
    }

    fn args(types: &[&str], reverse: bool, files: bool) -> DepsArgs {
        DepsArgs {
            types: types.iter().map(|s| s.to_string()).collect(),
            reverse,
            files,
            format: ReportFormat::Text,
        }
    }

    #[test]
    fn forward_edges_of_every_type() {
        let state = state();
        let edges = select(&state, &[], false);
        assert_eq!(edges.len(), 3);
        assert_eq!(
            edges["LA;"],
            BTreeSet::from(["LB;".to_string(), "Ljava/lang/Object;".to_string()])
        );
    }

    #[test]
    fn reverse_edges_of_selected_type() {
        let state = state();
        let a = args(&["LB;"], true, false);
        let edges = select(&state, &a.types, a.reverse);
        assert_eq!(render_text(&state, &edges, &a), "LB;  (B.java)\n  <- LA;\n");
    }

    #[test]
    fn unknown_type_has_no_edges() {
        let state = state();
        let a = args(&["LMissing;"], false, true);
        let edges = select(&state, &a.types, a.reverse);
        assert_eq!(
            render_text(&state, &edges, &a),
            "LMissing;\nA.java: LA$1;, LA;\nB.java: LB;\n"
        );
    }
}

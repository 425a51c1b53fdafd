//! `dexon plan`: a dry run of the incremental filter.
//!
//! Nothing is compiled and the incremental state is left untouched.

use std::path::PathBuf;

use dexon_diagnostics::DiagnosticSink;
use dexon_driver::{collect_sources, BuildPlan, BuildSession};

use crate::pipeline::{load_project, report};
use crate::{GlobalArgs, PlanArgs, ReportFormat};

/// Runs the `dexon plan` command.
pub fn run(args: &PlanArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let roots: Vec<PathBuf> = if args.sources.is_empty() {
        vec![project_dir.join("src")]
    } else {
        args.sources.iter().map(PathBuf::from).collect()
    };
    let sources = collect_sources(&roots)?;

    let sink = DiagnosticSink::new();
    let session = BuildSession::new(&config, &project_dir, &sink);
    let result = session.plan(&sources);
    let code = report(&sink, args.format, global);
    let plan = match result {
        Ok(plan) => plan,
        Err(err) => {
            if code == 0 {
                eprintln!("error: {err}");
            }
            return Ok(1);
        }
    };

    match args.format {
        ReportFormat::Text => print!("{}", render_text(&plan)),
        ReportFormat::Json => println!("{}", serde_json::to_string_pretty(&render_json(&plan))?),
    }
    Ok(code)
}

fn render_text(plan: &BuildPlan) -> String {
    let mut out = String::new();
    if !plan.incremental {
        out.push_str("incremental builds are off; every source is compiled\n");
    } else if plan.up_to_date {
        out.push_str("up to date\n");
        return out;
    } else if let Some(reason) = plan.rebuild {
        out.push_str(&format!("full rebuild: {reason}\n"));
    }

    let changes = &plan.changes;
    out.push_str(&format!(
        "{} added, {} modified, {} deleted, {} unchanged\n",
        changes.added.len(),
        changes.modified.len(),
        changes.deleted.len(),
        changes.unchanged.len()
    ));
    for file in &changes.deleted {
        out.push_str(&format!("  deleted {file}\n"));
    }
    if plan.remerge {
        out.push_str("nothing to compile; stored types are merged again\n");
    }
    for (i, file) in plan.files_to_compile.iter().enumerate() {
        out.push_str(&format!("{:>5}  {file}\n", i + 1));
    }
    out
}

fn render_json(plan: &BuildPlan) -> serde_json::Value {
    serde_json::json!({
        "incremental": plan.incremental,
        "up_to_date": plan.up_to_date,
        "remerge": plan.remerge,
        "rebuild": plan.rebuild.map(|reason| reason.to_string()),
        "added": plan.changes.added,
        "modified": plan.changes.modified,
        "deleted": plan.changes.deleted,
        "compile": plan.files_to_compile,
    })
}

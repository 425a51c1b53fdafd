//! `dexon merge`: writes `classes*.dex` again from the compiled types stored
//! in the incremental folder, without compiling anything.

use dexon_diagnostics::DiagnosticSink;
use dexon_driver::BuildSession;

use crate::pipeline::{load_project, report};
use crate::{GlobalArgs, MergeArgs, ReportFormat};

/// Runs the `dexon merge` command.
pub fn run(args: &MergeArgs, global: &GlobalArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let (project_dir, config) = load_project(global)?;
    let sink = DiagnosticSink::new();
    let session = BuildSession::new(&config, &project_dir, &sink);

    if !global.quiet && args.format == ReportFormat::Text {
        eprintln!(
            "    Merging {} ({})",
            config.project.name,
            config.dex.multidex.as_str()
        );
    }

    let result = session.merge();
    let code = report(&sink, args.format, global);
    let files = match result {
        Ok(files) => files,
        Err(err) => {
            if code == 0 {
                eprintln!("error: {err}");
            }
            return Ok(1);
        }
    };

    match args.format {
        ReportFormat::Text => {
            if !global.quiet {
                for file in &files {
                    println!(
                        "{:>16}  {} classes, {} methods, {} fields, {} bytes",
                        file.name,
                        file.types.len(),
                        file.counts.methods,
                        file.counts.fields,
                        file.bytes
                    );
                }
            }
        }
        ReportFormat::Json => {
            let value: Vec<serde_json::Value> = files
                .iter()
                .map(|file| {
                    serde_json::json!({
                        "name": file.name,
                        "bytes": file.bytes,
                        "types": file.types,
                        "methods": file.counts.methods,
                        "fields": file.counts.fields,
                        "type_ids": file.counts.types,
                        "protos": file.counts.protos,
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
    }
    Ok(code)
}

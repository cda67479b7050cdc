use std::time::Duration;

use super::*;
use crate::cli::{
    DEFAULT_CHEMBL_URL, DEFAULT_COMPLEMENT_CMD, DEFAULT_HTTP_TIMEOUT_SECS,
    DEFAULT_MONTHLY_BASE_URL, DEFAULT_PRIMARY_CMD, DEFAULT_SEGMENTER_CMD,
};

pub fn run(args: ExtractArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("extract-{}", utc_compact_string(started_ts));

    let target = Target::from_args(&args)?;
    let segmenter_tool =
        ToolCommand::parse(&args.segmenter_cmd).context("invalid --segmenter-cmd")?;
    let primary_tool = ToolCommand::parse(&args.primary_cmd).context("invalid --primary-cmd")?;
    let complement_tool = if args.complement_off {
        None
    } else {
        Some(ToolCommand::parse(&args.complement_cmd).context("invalid --complement-cmd")?)
    };

    info!(run_id = %run_id, selector = %target, "starting extraction");

    let mut documents = fetch_documents(&target, args.validation.http_timeout_secs)?;
    if documents.is_empty() {
        info!(selector = %target, "no documents found; nothing to process");
        return Ok(());
    }
    info!(documents = documents.len(), "fetched documents");

    for tool in [Some(&segmenter_tool), Some(&primary_tool), complement_tool.as_ref()]
        .into_iter()
        .flatten()
    {
        if !command_available(&tool.program) {
            warn!(command = %tool.render(), "external tool not found on PATH");
        }
    }

    let validator = build_validator(&args.validation)?;
    let segmenter = CommandSegmenter::new(segmenter_tool, args.text, args.direction);
    let primary = CommandRecognizer::new("primary", primary_tool);
    let complement = complement_tool.map(|tool| CommandRecognizer::new("complement", tool));

    let options = PipelineOptions {
        extract_text: args.text,
        separator: &args.separator,
        policy: args.complement_policy,
        seg_dir: args.seg_dir.as_deref(),
    };
    let outcome = extract_records(
        &mut documents,
        &segmenter,
        validator.as_ref(),
        &primary,
        complement
            .as_ref()
            .map(|recognizer| recognizer as &dyn StructureRecognizer),
        &options,
    )?;

    log_summary(&outcome.counts);

    if outcome.records.is_empty() {
        info!("nothing was extracted; no output written");
        return Ok(());
    }

    let output_path = default_output_path(
        &args.output_dir,
        &utc_compact_string(started_ts),
        args.output_format,
    );
    let written = sink_for(args.output_format, output_path).write(&outcome.records)?;

    let manifest_path = manifest_path_for(&written);
    let manifest = ExtractRunManifest {
        manifest_version: 1,
        run_id,
        status: "completed".to_string(),
        started_at,
        updated_at: now_utc_string(),
        command: render_extract_command(&args),
        target: target.to_string(),
        complement_enabled: !args.complement_off,
        complement_policy: args.complement_policy.as_str().to_string(),
        output_format: args.output_format.as_str().to_string(),
        output_path: written.display().to_string(),
        sources: source_entries(&documents),
        counts: outcome.counts,
        warnings: outcome.warnings,
    };
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote extraction run manifest");
    info!(path = %written.display(), "extraction completed");

    Ok(())
}

fn fetch_documents(target: &Target, http_timeout_secs: u64) -> Result<Vec<SourceDocument>> {
    let source: Box<dyn DocumentSource> = match target {
        Target::Directory(_) => Box::new(LocalDocumentSource),
        Target::Url(_) | Target::Monthly { .. } => Box::new(HttpDocumentSource::new(
            Duration::from_secs(http_timeout_secs),
        )?),
    };
    source.fetch(target)
}

pub(super) fn manifest_path_for(output: &Path) -> PathBuf {
    let stem = output
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("results");
    output.with_file_name(format!("{stem}.manifest.json"))
}

pub(super) fn render_extract_command(args: &ExtractArgs) -> String {
    let mut command = vec!["molhunt".to_string(), "extract".to_string()];

    if let Some(url) = &args.url {
        command.push("--url".to_string());
        command.push(url.clone());
    }
    if let Some(year) = args.year {
        command.push("--year".to_string());
        command.push(year.to_string());
    }
    if let Some(month) = &args.month {
        command.push("--month".to_string());
        command.push(month.clone());
    }
    if let Some(dir) = &args.input_dir {
        command.push("--input-dir".to_string());
        command.push(dir.display().to_string());
    }
    if args.year.is_some() && args.base_url != DEFAULT_MONTHLY_BASE_URL {
        command.push("--base-url".to_string());
        command.push(args.base_url.clone());
    }
    if args.text {
        command.push("--text".to_string());
        command.push("--direction".to_string());
        command.push(args.direction.as_str().to_string());
        command.push("--separator".to_string());
        command.push(args.separator.clone());
    }
    if args.complement_off {
        command.push("--complement-off".to_string());
    } else if args.complement_policy != ComplementPolicy::Invalid {
        command.push("--complement-policy".to_string());
        command.push(args.complement_policy.as_str().to_string());
    }
    if let Some(dir) = &args.seg_dir {
        command.push("--seg-dir".to_string());
        command.push(dir.display().to_string());
    }
    command.push("--output-dir".to_string());
    command.push(args.output_dir.display().to_string());
    if args.output_format != OutputFormat::Csv {
        command.push("--output-format".to_string());
        command.push(args.output_format.as_str().to_string());
    }
    for (flag, value, default) in [
        ("--segmenter-cmd", &args.segmenter_cmd, DEFAULT_SEGMENTER_CMD),
        ("--primary-cmd", &args.primary_cmd, DEFAULT_PRIMARY_CMD),
        ("--complement-cmd", &args.complement_cmd, DEFAULT_COMPLEMENT_CMD),
        ("--chembl-url", &args.validation.chembl_url, DEFAULT_CHEMBL_URL),
    ] {
        if flag == "--complement-cmd" && args.complement_off {
            continue;
        }
        if value.as_str() != default {
            command.push(flag.to_string());
            command.push(quote_if_needed(value));
        }
    }
    if args.validation.http_timeout_secs != DEFAULT_HTTP_TIMEOUT_SECS {
        command.push("--http-timeout-secs".to_string());
        command.push(args.validation.http_timeout_secs.to_string());
    }
    if let Some(cache) = &args.validation.validation_cache {
        command.push("--validation-cache".to_string());
        command.push(cache.display().to_string());
    }

    command.join(" ")
}

fn quote_if_needed(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("'{value}'")
    } else {
        value.to_string()
    }
}

/*++

Licensed under the Apache-2.0 license.

File Name:

    main.rs

Abstract:

    Main entry point of the mboot-check measurement tool: measures a
    multi-stage firmware image, optionally compares the expected register
    values against a live TPM, and generates attestation allow-lists.

--*/

use std::path::PathBuf;

use anyhow::Context;
use clap::builder::PossibleValuesParser;
use clap::{arg, value_parser, Arg, ArgAction, ArgMatches, Command};

use mboot_image::{ImageError, ImageMeta};
use mboot_measure::{
    attest_component_names, build_report, generate_allowlist, HashAlgo, MeasureConfig,
    MeasureError, MeasurementResult, NOT_AVAILABLE,
};

const MBOOT_CHECK_VERSION: &str = "4";

const EC_SUCCESS: i32 = 0;
const EC_MEASURE_FAIL: i32 = 1;
const EC_EXCEPTION: i32 = 255;

fn build_cli() -> Command {
    let mut components = vec!["ALL"];
    components.extend(attest_component_names());

    Command::new("mboot-check")
        .about("Measure a firmware image and compare with TPM PCRs")
        .version(MBOOT_CHECK_VERSION)
        .arg(
            arg!(-a --algo <ALGO> "hash algorithm")
                .required(false)
                .value_parser(["sha1", "sha256"])
                .default_value("sha256"),
        )
        .arg(
            Arg::new("flash0")
                .short('0')
                .long("flash0")
                .value_name("FILE")
                .help("flash0 device or image")
                .default_value("/dev/flash0")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("flash1")
                .short('1')
                .long("flash1")
                .value_name("FILE")
                .help("flash1 device or image")
                .default_value("/dev/flash1")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            arg!(-i --image <FILE> "single image used for both banks")
                .required(false)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(arg!(-j --json "output as JSON"))
        .arg(arg!(-t --tpm "also read the TPM PCRs and the live VBS"))
        .arg(arg!(-r --recal "recalculate and assert embedded signed hashes"))
        .arg(
            Arg::new("components")
                .short('c')
                .long("components")
                .value_name("COMPONENT")
                .help("output raw hash (measure) values of the given components")
                .num_args(0..)
                .action(ArgAction::Append)
                .value_parser(PossibleValuesParser::new(components)),
        )
}

fn main() {
    env_logger::init();
    let args = build_cli().get_matches();
    match run(&args) {
        Ok(()) => std::process::exit(EC_SUCCESS),
        Err(err) => {
            eprintln!("Error: {err:#}");
            let code = if err.is::<MeasureError>() || err.is::<ImageError>() {
                EC_MEASURE_FAIL
            } else {
                EC_EXCEPTION
            };
            std::process::exit(code);
        }
    }
}

fn run(args: &ArgMatches) -> anyhow::Result<()> {
    let (flash0_path, flash1_path) = match args.get_one::<PathBuf>("image") {
        Some(image) => (image.clone(), image.clone()),
        None => (
            args.get_one::<PathBuf>("flash0").cloned().unwrap_or_default(),
            args.get_one::<PathBuf>("flash1").cloned().unwrap_or_default(),
        ),
    };
    let flash0 = ImageMeta::load(&flash0_path)
        .with_context(|| format!("loading image meta from {}", flash0_path.display()))?;
    let flash1 = ImageMeta::load(&flash1_path)
        .with_context(|| format!("loading image meta from {}", flash1_path.display()))?;

    let cfg = MeasureConfig {
        algo: HashAlgo::from_name(
            args.get_one::<String>("algo").map(String::as_str).unwrap_or("sha256"),
        )?,
        recalc: args.get_flag("recal"),
    };
    let json = args.get_flag("json");

    let components: Vec<String> = args
        .get_many::<String>("components")
        .map(|v| v.cloned().collect())
        .unwrap_or_default();
    if !components.is_empty() {
        return run_allowlist(&flash0, &flash1, cfg, json, &components);
    }
    run_measure(&flash0, &flash1, cfg, json, args.get_flag("tpm"))
}

fn run_measure(
    flash0: &ImageMeta,
    flash1: &ImageMeta,
    cfg: MeasureConfig,
    json: bool,
    tpm: bool,
) -> anyhow::Result<()> {
    let mut results = build_report(flash0, flash1, cfg, tpm)?;

    if tpm {
        // TPM absence or tool failure degrades single registers to "NA";
        // it never aborts the rest of the report
        for result in &mut results {
            match mboot_tpm::read_pcr(&result.algo, result.pcr_id) {
                Ok(digest) => result.measure = hex::encode(digest),
                Err(err) => {
                    log::warn!("pcr{} ({}): {err}", result.pcr_id, result.component);
                    result.measure = NOT_AVAILABLE.to_string();
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string(&results)?);
    } else {
        for result in &results {
            print_measure_row(result);
        }
    }
    Ok(())
}

fn print_measure_row(result: &MeasurementResult) {
    println!(
        "{:2}:[{}] ({})",
        result.pcr_id, result.expect, result.component
    );
    println!("   [{}] (pcr{})", result.measure, result.pcr_id);
}

fn run_allowlist(
    flash0: &ImageMeta,
    flash1: &ImageMeta,
    cfg: MeasureConfig,
    json: bool,
    components: &[String],
) -> anyhow::Result<()> {
    let all = attest_component_names();
    let selected: Vec<&str> = if components.iter().any(|c| c == "ALL") {
        all
    } else {
        components.iter().map(String::as_str).collect()
    };

    let entries = generate_allowlist(
        flash0,
        flash1,
        cfg.recalc,
        flash0.fw_version(),
        &selected,
    )?;

    if json {
        println!("{}", serde_json::to_string(&entries)?);
    } else {
        for entry in &entries {
            println!("{:27}:{}", format!("{}(sha1)", entry.name()), entry.hashes.sha1);
            println!(
                "{:27}:{}",
                format!("{}(sha256)", entry.name()),
                entry.hashes.sha256
            );
        }
    }
    Ok(())
}

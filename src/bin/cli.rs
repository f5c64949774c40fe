use clap::{App, Arg, ArgMatches, SubCommand};
use crashring::{
    error::CrashLogError, AnimationInvocation, AnimationInvocationType, ChannelKind,
    CharacterBaseConstruction, CrashLogReader, CrashLogWriter, LogConfig, ModdedFileResolution,
    ProcessInfo, Result,
};
use std::{path::PathBuf, str::FromStr};

fn main() -> Result<()> {
    env_logger::init();

    let dir_arg = Arg::with_name("dir")
        .short("d")
        .long("dir")
        .value_name("DIR")
        .help("Directory holding the segment files")
        .takes_value(true);
    let prefix_arg = Arg::with_name("prefix")
        .long("prefix")
        .value_name("PREFIX")
        .help("Segment name prefix")
        .takes_value(true);
    let config_arg = Arg::with_name("config")
        .short("c")
        .long("config")
        .value_name("FILE")
        .help("JSON configuration file")
        .takes_value(true);

    let matches = App::new("crashring-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Read and exercise shared-memory crash logs")
        .subcommand(
            SubCommand::with_name("dump")
                .about("Dump the crash logs of a host process as JSON")
                .arg(
                    Arg::with_name("pid")
                        .short("p")
                        .long("pid")
                        .value_name("PID")
                        .help("Process id of the host")
                        .required(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("label")
                        .short("l")
                        .long("label")
                        .value_name("LABEL")
                        .help("Reason for the dump")
                        .default_value("Crash")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("exit_code")
                        .long("exit-code")
                        .value_name("CODE")
                        .help("Exit code of the host")
                        .default_value("0")
                        .allow_hyphen_values(true)
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("build_version")
                        .long("build-version")
                        .value_name("VERSION")
                        .help("Version of the logging build")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("target_version")
                        .long("target-version")
                        .value_name("VERSION")
                        .help("Version of the host application")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("output")
                        .short("o")
                        .long("output")
                        .value_name("FILE")
                        .help("Write the report to FILE instead of stdout")
                        .takes_value(true),
                )
                .arg(dir_arg.clone())
                .arg(prefix_arg.clone())
                .arg(config_arg.clone()),
        )
        .subcommand(
            SubCommand::with_name("simulate")
                .about("Act as a host: write sample events and dump them")
                .arg(
                    Arg::with_name("count")
                        .short("n")
                        .long("count")
                        .value_name("COUNT")
                        .help("Events per channel")
                        .default_value("100")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("keep")
                        .long("keep")
                        .help("Leave the segments in place for a separate dump"),
                )
                .arg(dir_arg)
                .arg(prefix_arg)
                .arg(config_arg),
        )
        .subcommand(SubCommand::with_name("info").about("Show version and channel layouts"))
        .get_matches();

    match matches.subcommand() {
        ("dump", Some(dump_matches)) => handle_dump(dump_matches),
        ("simulate", Some(sim_matches)) => handle_simulate(sim_matches),
        ("info", Some(_)) => show_info(),
        _ => {
            println!("Use --help for usage information");
            Ok(())
        }
    }
}

fn parse_arg<T: FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    let raw = matches
        .value_of(name)
        .ok_or_else(|| CrashLogError::invalid_parameter(name, "missing value"))?;
    raw.parse()
        .map_err(|_| CrashLogError::invalid_parameter(name, format!("invalid value {:?}", raw)))
}

fn load_config(matches: &ArgMatches) -> Result<LogConfig> {
    let mut config = match matches.value_of("config") {
        Some(path) => LogConfig::from_json_file(path)?,
        None => LogConfig::default(),
    };
    if let Some(dir) = matches.value_of("dir") {
        config = config.with_directory(PathBuf::from(dir));
    }
    if let Some(prefix) = matches.value_of("prefix") {
        config = config.with_name_prefix(prefix);
    }
    Ok(config)
}

fn handle_dump(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let pid: u32 = parse_arg(matches, "pid")?;
    let exit_code: i32 = parse_arg(matches, "exit_code")?;

    let info = ProcessInfo::new(matches.value_of("label").unwrap_or("Crash"), pid)
        .with_exit_code(exit_code)
        .with_versions(
            matches.value_of("build_version").unwrap_or(crashring::VERSION),
            matches.value_of("target_version").unwrap_or(""),
        );

    let reader = CrashLogReader::open(&config, pid);
    if reader.available_channels() == 0 {
        eprintln!(
            "No crash log segments found for process {} in {}",
            pid,
            config.resolved_directory().display()
        );
    }

    let report = reader.dump(&info);
    match matches.value_of("output") {
        Some(path) => {
            report.write_to_file(path)?;
            println!("Wrote {} channel(s) to {}", report.channel_count(), path);
        }
        None => println!("{}", report.to_json_pretty()?),
    }
    Ok(())
}

fn handle_simulate(matches: &ArgMatches) -> Result<()> {
    let config = load_config(matches)?;
    let count: usize = parse_arg(matches, "count")?;

    let writer = CrashLogWriter::open(&config);
    println!(
        "Writing {} events per channel as process {}",
        count,
        writer.process_id()
    );

    let kinds = AnimationInvocationType::ALL;
    for i in 0..count {
        let address = 0x7FF0_0000_0000 + (i as u64) * 0x10;
        let name = format!("Actor {}", i % 8);
        writer.log_animation(address, name.as_bytes(), "Default", kinds[i % kinds.len()]);
        if i % 10 == 0 {
            writer.log_character_base(address, name.as_bytes(), "Default");
        }
        writer.log_modded_file(
            address,
            name.as_bytes(),
            "Default",
            format!("chara/monster/m{:04}/obj/body/b0001/model.mdl", i).as_bytes(),
            format!("/mods/sample/m{:04}.mdl", i).as_bytes(),
        );
    }

    let report = writer.dump(&ProcessInfo::new("Manual", writer.process_id()));
    println!("{}", report.to_json_pretty()?);

    if matches.is_present("keep") {
        println!(
            "Segments kept in {}; dump them with: crashring-cli dump --pid {}",
            config.resolved_directory().display(),
            writer.process_id()
        );
        Ok(())
    } else {
        writer.close()
    }
}

fn show_info() -> Result<()> {
    println!("crashring v{}", crashring::VERSION);
    println!("Segment directory: {}", crashring::memory::default_shm_dir().display());
    println!();
    println!("Channels:");
    print_channel::<AnimationInvocation>();
    print_channel::<CharacterBaseConstruction>();
    print_channel::<ModdedFileResolution>();
    Ok(())
}

fn print_channel<K: ChannelKind>() {
    println!(
        "  {:<28} v{}  {:>4} lines x {:>5} bytes (min {} bytes)",
        K::NAME,
        K::VERSION,
        K::DEFAULT_LINE_COUNT,
        K::DEFAULT_LINE_CAPACITY,
        K::MIN_LINE_CAPACITY
    );
}

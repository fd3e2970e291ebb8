use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use segdir::{
    config::{DEFAULT_CAPACITY, DEFAULT_NAMESPACE},
    Client, ClientConfig, ReleaseOutcome, Result, SegdirError, SystemLock,
};
use std::io::Write;

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let default_capacity = DEFAULT_CAPACITY.to_string();

    let id_arg = Arg::with_name("id")
        .short("i")
        .long("id")
        .value_name("ID")
        .help("Slot id")
        .required(true)
        .takes_value(true);

    let matches = App::new("segdir-cli")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Shared memory segment directory CLI tool")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("namespace")
                .short("n")
                .long("namespace")
                .value_name("NAME")
                .help("Prefix of shared memory and semaphore names")
                .default_value(DEFAULT_NAMESPACE)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("lock_key")
                .short("l")
                .long("lock-key")
                .value_name("KEY")
                .help("Key of the system lock")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("directory_key")
                .short("d")
                .long("directory-key")
                .value_name("KEY")
                .help("Base key of the directory")
                .required(true)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("capacity")
                .short("c")
                .long("capacity")
                .value_name("SLOTS")
                .help("Slot count used if the directory has to be created")
                .default_value(&default_capacity)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("file_backed")
                .long("file-backed")
                .value_name("DIR")
                .help("Store segments as files under DIR instead of POSIX shared memory")
                .takes_value(true),
        )
        .subcommand(SubCommand::with_name("alloc").about("Allocate a slot and print its id"))
        .subcommand(
            SubCommand::with_name("write")
                .about("Write data to a slot")
                .arg(id_arg.clone())
                .arg(
                    Arg::with_name("data")
                        .long("data")
                        .value_name("TEXT")
                        .help("Literal data to store")
                        .takes_value(true)
                        .conflicts_with("file"),
                )
                .arg(
                    Arg::with_name("file")
                        .short("f")
                        .long("file")
                        .value_name("PATH")
                        .help("File whose contents are stored")
                        .takes_value(true)
                        .required_unless("data"),
                ),
        )
        .subcommand(
            SubCommand::with_name("read")
                .about("Print the contents of a slot")
                .arg(id_arg.clone()),
        )
        .subcommand(
            SubCommand::with_name("release")
                .about("Release a slot")
                .arg(id_arg),
        )
        .subcommand(
            SubCommand::with_name("destroy")
                .about("Release every slot and delete the directory")
                .arg(
                    Arg::with_name("unlink_lock")
                        .long("unlink-lock")
                        .help("Also remove the system lock"),
                ),
        )
        .get_matches();

    let config = client_config(&matches)?;

    match matches.subcommand() {
        ("alloc", Some(_)) => {
            let mut client = Client::new(config)?;
            println!("{}", client.allocate_segment()?);
        }
        ("write", Some(write_matches)) => {
            let id = parse_arg(write_matches, "id")?;
            let data = match write_matches.value_of("data") {
                Some(text) => text.as_bytes().to_vec(),
                None => {
                    let path = required(write_matches, "file")?;
                    std::fs::read(path)
                        .map_err(|e| SegdirError::from_io(e, &format!("Failed to read {}", path)))?
                }
            };
            let mut client = Client::new(config)?;
            client.write_to_segment(id, &data)?;
            println!("Wrote {} bytes to slot {}", data.len(), id);
        }
        ("read", Some(read_matches)) => {
            let id = parse_arg(read_matches, "id")?;
            let mut client = Client::new(config)?;
            match client.read_segment(id)? {
                Some(data) => {
                    let mut stdout = std::io::stdout();
                    stdout.write_all(&data)?;
                    stdout.flush()?;
                }
                None => eprintln!("Slot {} is empty", id),
            }
        }
        ("release", Some(release_matches)) => {
            let id = parse_arg(release_matches, "id")?;
            let mut client = Client::new(config)?;
            match client.release_segment(id)? {
                ReleaseOutcome::Released => println!("Released slot {}", id),
                ReleaseOutcome::AlreadyEmpty => println!("Slot {} was already empty", id),
                ReleaseOutcome::OutOfRange => println!("Slot {} is outside the directory", id),
            }
        }
        ("destroy", Some(destroy_matches)) => {
            let region = config.region.clone();
            let lock_key = config.lock_key;
            {
                let mut client = Client::new(config)?;
                client.destroy()?;
            }
            if destroy_matches.is_present("unlink_lock") {
                SystemLock::unlink(&region, lock_key)?;
            }
            println!("Directory destroyed");
        }
        _ => println!("Use --help for usage information"),
    }

    Ok(())
}

fn client_config(matches: &ArgMatches) -> Result<ClientConfig> {
    let mut config = ClientConfig::new(
        parse_arg(matches, "lock_key")?,
        parse_arg(matches, "directory_key")?,
    )
    .with_capacity(parse_arg(matches, "capacity")?)
    .with_namespace(required(matches, "namespace")?);

    if let Some(dir) = matches.value_of("file_backed") {
        config = config.with_base_dir(dir);
    }

    Ok(config)
}

fn required<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| SegdirError::invalid_parameter(name, "Missing value"))
}

fn parse_arg<T: std::str::FromStr>(matches: &ArgMatches, name: &str) -> Result<T> {
    required(matches, name)?
        .parse()
        .map_err(|_| SegdirError::invalid_parameter(name, "Invalid number format"))
}

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ArgAction::Set;
use clap::{Parser, Subcommand};
use tracing::{event, span, Level};
use tracing_subscriber::prelude::*;

use base::ckd::{records, COUNT_LEN};
use base::image::{cylinder_offset, format_image, open_image};
use base::prelude::*;
use dasd::*;

const AUTHOR: &str = "James Youngman <james@youngman.org>";

/// Simulator for count-key-data disk drives and their controller
#[derive(Parser, Debug)]
#[clap(author = AUTHOR, version, about, long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write a freshly formatted disk image.
    Format {
        /// File to which the image is written.
        #[clap(action = Set)]
        image: PathBuf,

        /// The drive model whose geometry the image has.
        #[clap(action = Set, long, default_value = "2314")]
        drive_type: DriveType,
    },

    /// Show the header of a disk image and the records on one of its
    /// tracks.
    Inspect {
        #[clap(action = Set)]
        image: PathBuf,

        #[clap(action = Set, long, default_value_t = 0)]
        cylinder: u16,

        #[clap(action = Set, long, default_value_t = 0)]
        head: u16,
    },

    /// Attach an image to a simulated controller, seek to a track
    /// and read its record zero.
    Probe {
        #[clap(action = Set)]
        image: PathBuf,

        /// TOML file describing the controller and its drives.
        #[clap(action = Set, long)]
        config: Option<PathBuf>,

        /// Device address of the drive to use (default: the first
        /// configured drive).
        #[clap(action = Set, long, value_parser = parse_address)]
        unit: Option<u8>,

        #[clap(action = Set, long)]
        cylinder: u16,

        #[clap(action = Set, long)]
        head: u16,
    },
}

#[derive(Debug)]
enum Fail {
    Io(PathBuf, io::Error),
    Image(PathBuf, ImageError),
    Track(TrackFormatError),
    Device(DeviceError),
    Register(RegisterError),
    Config(String),
    /// We were not able to correctly initialise the simulator.
    InitialisationFailure(String),
}

impl Display for Fail {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        match self {
            Fail::Io(path, e) => write!(f, "{}: {e}", path.display()),
            Fail::Image(path, e) => write!(f, "{}: {e}", path.display()),
            Fail::Track(e) => e.fmt(f),
            Fail::Device(e) => e.fmt(f),
            Fail::Register(e) => e.fmt(f),
            Fail::Config(msg) | Fail::InitialisationFailure(msg) => f.write_str(msg.as_str()),
        }
    }
}

impl Error for Fail {}

impl From<DeviceError> for Fail {
    fn from(e: DeviceError) -> Fail {
        Fail::Device(e)
    }
}

impl From<RegisterError> for Fail {
    fn from(e: RegisterError) -> Fail {
        Fail::Register(e)
    }
}

fn parse_address(s: &str) -> Result<u8, String> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    u8::from_str_radix(digits, 16).map_err(|e| format!("'{s}' is not a device address: {e}"))
}

fn format(path: &Path, drive_type: DriveType) -> Result<(), Fail> {
    let mut file = File::create(path).map_err(|e| Fail::Io(path.to_owned(), e))?;
    format_image(&mut file, drive_type.geometry()).map_err(|e| Fail::Image(path.to_owned(), e))?;
    event!(
        Level::INFO,
        "wrote {} cylinders of a {} image to {}",
        drive_type.geometry().cylinders,
        drive_type,
        path.display()
    );
    Ok(())
}

/// Work out the geometry of an existing image from its header.
fn image_geometry(path: &Path, file: &mut File) -> Result<&'static DiskGeometry, Fail> {
    let header = ImageHeader::read_from(file).map_err(|e| Fail::Image(path.to_owned(), e))?;
    let drive_type = DriveType::from_device_type_code(header.device_type).ok_or_else(|| {
        Fail::Config(format!(
            "{}: unknown device type code {:02X}",
            path.display(),
            header.device_type
        ))
    })?;
    let geometry = drive_type.geometry();
    open_image(file, geometry).map_err(|e| Fail::Image(path.to_owned(), e))?;
    Ok(geometry)
}

fn inspect(path: &Path, cylinder: u16, head: u16) -> Result<(), Fail> {
    let mut file = File::open(path).map_err(|e| Fail::Io(path.to_owned(), e))?;
    let geometry = image_geometry(path, &mut file)?;
    if cylinder > geometry.highest_cylinder() || head >= geometry.heads {
        return Err(Fail::Config(format!(
            "a {} has no track at cylinder {cylinder} head {head}",
            geometry.name
        )));
    }
    println!(
        "{}: {} image, {} cylinders of {} tracks, {} bytes per track",
        path.display(),
        geometry.name,
        geometry.cylinders,
        geometry.heads,
        geometry.bytes_per_track
    );

    let mut track = vec![0_u8; geometry.track_size()];
    let offset =
        cylinder_offset(geometry, cylinder) + u64::from(head) * geometry.track_size() as u64;
    file.seek(SeekFrom::Start(offset))
        .and_then(|_| file.read_exact(&mut track))
        .map_err(|e| Fail::Io(path.to_owned(), e))?;
    println!("cylinder {cylinder} head {head}:");
    for record in records(&track) {
        let record = record.map_err(Fail::Track)?;
        println!(
            "  {:5}  {}  key {:3}  data {:5}",
            record.offset, record.count.id, record.count.key_length, record.count.data_length
        );
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<ControllerConfiguration, Fail> {
    let text = fs::read_to_string(path).map_err(|e| Fail::Io(path.to_owned(), e))?;
    toml::from_str(&text).map_err(|e| Fail::Config(format!("{}: {e}", path.display())))
}

fn probe(
    path: &Path,
    config: Option<&Path>,
    unit: Option<u8>,
    cylinder: u16,
    head: u16,
) -> Result<(), Fail> {
    let config = match config {
        Some(config_path) => read_config(config_path)?,
        None => ControllerConfiguration::default(),
    };
    let address = match unit.or_else(|| config.units.first().map(|u| u.address)) {
        Some(address) => address,
        None => {
            return Err(Fail::Config(
                "the configuration does not include any drives".to_string(),
            ));
        }
    };
    let device = config.device_address;

    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| Fail::Io(path.to_owned(), e))?;
    let mut disks = DiskSubsystem::new(&config);
    let start = Context::at(Duration::ZERO);
    disks
        .controller_mut()
        .attach(&start, address, Box::new(file))?;

    // Words 0-1 hold the seek argument, words 8-9 receive R0's count.
    let mut mem = VecMemory::new(16);
    let [c0, c1] = cylinder.to_be_bytes();
    let [h0, h1] = head.to_be_bytes();
    mem.words_mut()[0] = u32::from_be_bytes([0, 0, c0, c1]);
    mem.words_mut()[1] = u32::from_be_bytes([h0, h1, 0, 0]);

    let program = [
        (0, CommandWord::new(CommandCode::Seek.opcode(), address).chained()),
        (8, CommandWord::new(CommandCode::ReadRecordZero.opcode(), address)),
    ];
    for (buffer, command) in program {
        disks.write_data(device, buffer)?;
        disks.write_control(&start, device, ControlWord::LoadCount(2).encode(), &mut mem)?;
        disks.write_control(&start, device, command.encode(), &mut mem)?;
    }
    let finished = disks.run_until_idle(Duration::ZERO, &mut mem);
    let status = disks.read_status(device)?;
    println!("status {status:08X} after {finished:?}");

    if status & STATUS_UNIT_CHECK != 0 {
        if let Some(sense) = disks.controller().sense(address) {
            println!("sense {:02X} {:02X}", sense.byte0, sense.byte1);
        }
        return Ok(());
    }
    let count: Vec<u8> = mem.words()[8..10]
        .iter()
        .flat_map(|w| w.to_be_bytes())
        .take(COUNT_LEN)
        .collect();
    match CountField::from_bytes(&count) {
        Some(count) => println!(
            "R0 {} key {} data {}",
            count.id, count.key_length, count.data_length
        ),
        None => println!("R0 count field unreadable: {count:02X?}"),
    }
    Ok(())
}

fn run_simulator() -> Result<(), Fail> {
    let cli = Cli::parse();

    // See
    // https://docs.rs/tracing-subscriber/0.2.19/tracing_subscriber/fmt/index.html#filtering-events-with-environment-variables
    // for instructions on how to select which trace messages get
    // printed.
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);
    let filter_layer = match tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
    {
        Err(e) => {
            return Err(Fail::InitialisationFailure(format!(
                "failed to initialise tracing filter (perhaps there is a problem with environment variables): {e}"
            )));
        }
        Ok(layer) => layer,
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();

    match cli.command {
        Command::Format { image, drive_type } => {
            let span = span!(Level::ERROR, "format", image=?image, drive_type=%drive_type);
            let _enter = span.enter();
            format(&image, drive_type)
        }
        Command::Inspect {
            image,
            cylinder,
            head,
        } => {
            let span = span!(Level::ERROR, "inspect", image=?image);
            let _enter = span.enter();
            inspect(&image, cylinder, head)
        }
        Command::Probe {
            image,
            config,
            unit,
            cylinder,
            head,
        } => {
            let span = span!(Level::ERROR, "probe", image=?image);
            let _enter = span.enter();
            probe(&image, config.as_deref(), unit, cylinder, head)
        }
    }
}

fn main() {
    match run_simulator() {
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(1);
        }
        Ok(()) => {
            std::process::exit(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("81"), Ok(0x81));
        assert_eq!(parse_address("0x8F"), Ok(0x8F));
        assert!(parse_address("100").is_err());
        assert!(parse_address("zz").is_err());
    }

    #[test]
    fn test_config_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temporary file");
        std::io::Write::write_all(
            &mut file,
            b"device_address = 0x90\n\n[[units]]\naddress = 0x90\ndrive_type = \"2311\"\n",
        )
        .expect("write config");
        let config = read_config(file.path()).expect("config should parse");
        assert_eq!(config.device_address, 0x90);
        assert_eq!(config.units.len(), 1);
        assert_eq!(config.units[0].drive_type, DriveType::Ibm2311);
    }
}

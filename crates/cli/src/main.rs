use std::fs::{self, File};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::process;
use std::thread;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{Local, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use crossbeam_channel::{unbounded, Receiver, Sender};

use face_attendance_core::attendance::infrastructure::csv_exporter::export_attendance;
use face_attendance_core::capture::infrastructure::image_directory_source::ImageDirectorySource;
use face_attendance_core::detection::domain::detection_service::DetectionService;
use face_attendance_core::detection::infrastructure::http_detection_service::HttpDetectionService;
use face_attendance_core::detection::infrastructure::scripted_detection_service::ScriptedDetectionService;
use face_attendance_core::identity::directory_service::DirectoryService;
use face_attendance_core::identity::domain::person::{
    AccountKind, AdminInfo, Designation, StudentInfo, Year,
};
use face_attendance_core::persistence::infrastructure::json_file_store::JsonFileStore;
use face_attendance_core::pipeline::capture_scheduler::CaptureScheduler;
use face_attendance_core::pipeline::cycle_logger::StdoutCycleLogger;
use face_attendance_core::pipeline::face_login_use_case::FaceLoginUseCase;
use face_attendance_core::pipeline::infrastructure::polling_loop::{
    LoopCommand, LoopEvent, PollingLoop,
};
use face_attendance_core::pipeline::mark_attendance_use_case::MarkAttendanceUseCase;
use face_attendance_core::scheduling::activity_signal::ActivitySignal;
use face_attendance_core::session::session_monitor::SessionMonitor;
use face_attendance_core::shared::config::EngineConfig;

/// Live face attendance and directory administration.
#[derive(Parser)]
#[command(name = "face-attendance")]
struct Cli {
    /// Directory holding the JSON collections (defaults to the platform data dir).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Engine config file (defaults to the platform config dir, if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the live analyzer over a directory of frames.
    ///
    /// Reads `start`, `stop`, `quit` or an activity signal
    /// (`mousemove`, `keydown`, `click`, `scroll`) per stdin line.
    Analyze {
        /// Image file or directory of frames, replayed in name order.
        frames: PathBuf,
        #[command(flatten)]
        detector: DetectorArgs,
        /// Wait for `start` instead of capturing immediately.
        #[arg(long)]
        paused: bool,
    },
    /// Log in by face.
    Login {
        #[arg(long, value_enum)]
        kind: KindArg,
        /// Camera frame to match.
        #[arg(long)]
        image: PathBuf,
        #[arg(long)]
        detector_url: String,
        /// Minimum recognition confidence (0.0-1.0).
        #[arg(long, env = "FACE_RECOGNITION_CONFIDENCE_THRESHOLD")]
        threshold: Option<f64>,
    },
    /// Mark attendance for a student from one camera frame.
    MarkAttendance {
        roll_number: String,
        #[arg(long)]
        image: PathBuf,
        #[command(flatten)]
        detector: DetectorArgs,
    },
    RegisterStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        roll_number: String,
        #[arg(long)]
        department: String,
        /// 1-4 or "1st Year" etc.
        #[arg(long)]
        year: Year,
        /// Reference photo used for face login.
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    RegisterAdmin {
        #[arg(long)]
        name: String,
        #[arg(long)]
        id_number: String,
        #[arg(long)]
        phone_number: String,
        #[arg(long)]
        department: String,
        #[arg(long)]
        designation: Designation,
        #[arg(long)]
        photo: Option<PathBuf>,
    },
    AddDepartment { name: String },
    /// Link a tracked persistent id to a student.
    LinkFace { persistent_id: u32, roll_number: String },
    /// Allocate a fresh persistent id for a student's own face.
    SelfLink { roll_number: String },
    BlockStudent {
        roll_number: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    DeleteStudent {
        roll_number: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    BlockAdmin {
        id_number: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    DeleteAdmin {
        id_number: String,
        #[command(flatten)]
        actor: ActorArgs,
    },
    /// List attendance, newest first.
    Attendance {
        /// Only this student's records.
        #[arg(long)]
        roll_number: Option<String>,
    },
    AuditLog,
    /// Write the attendance report as CSV.
    ExportCsv {
        /// Output file (defaults to attendance_report_<date>.csv).
        output: Option<PathBuf>,
    },
}

#[derive(clap::Args)]
struct DetectorArgs {
    /// Base URL of the detection service.
    #[arg(long, conflicts_with = "script", required_unless_present = "script")]
    detector_url: Option<String>,
    /// JSON file of scripted detector answers, replayed in order.
    #[arg(long)]
    script: Option<PathBuf>,
}

#[derive(clap::Args)]
struct ActorArgs {
    /// Admin id the action is attributed to in the audit log.
    #[arg(long = "as")]
    actor: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Admin,
    Student,
}

impl From<KindArg> for AccountKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Admin => AccountKind::Admin,
            KindArg::Student => AccountKind::Student,
        }
    }
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_deref())?;
    let mut directory = open_directory(cli.data_dir)?;

    match cli.command {
        Command::Analyze {
            frames,
            detector,
            paused,
        } => run_analyze(&frames, &detector, paused, &config, directory)?,
        Command::Login {
            kind,
            image,
            detector_url,
            threshold,
        } => {
            if let Some(threshold) = threshold {
                config.recognition_threshold = threshold;
                config.validate()?;
            }
            let mut use_case = FaceLoginUseCase::new(
                Box::new(ImageDirectorySource::new(image)),
                Box::new(HttpDetectionService::new(&detector_url)?),
                Box::new(HttpDetectionService::new(&detector_url)?),
                &config,
            );
            let person = use_case.execute(kind.into(), &directory)?;
            println!("Welcome, {} ({} {})", person.name(), person.kind(), person.id());
        }
        Command::MarkAttendance {
            roll_number,
            image,
            detector,
        } => {
            let mut use_case = MarkAttendanceUseCase::new(
                Box::new(ImageDirectorySource::new(image)),
                build_detector(&detector)?,
            );
            let record = use_case.execute(&roll_number, &mut directory, Utc::now())?;
            println!(
                "Attendance marked for {roll_number} (face #{}, {})",
                record.persistent_id, record.emotion
            );
        }
        Command::RegisterStudent {
            name,
            roll_number,
            department,
            year,
            photo,
        } => {
            directory.register_student(StudentInfo {
                name,
                roll_number: roll_number.clone(),
                department,
                year,
                is_blocked: false,
                photo_base64: read_photo(photo.as_deref())?,
            })?;
            println!("Registered student {roll_number}");
        }
        Command::RegisterAdmin {
            name,
            id_number,
            phone_number,
            department,
            designation,
            photo,
        } => {
            directory.register_admin(AdminInfo {
                name,
                id_number: id_number.clone(),
                phone_number,
                department,
                designation,
                is_blocked: false,
                photo_base64: read_photo(photo.as_deref())?,
            })?;
            println!("Registered admin {id_number}");
        }
        Command::AddDepartment { name } => {
            let departments = directory.add_department(&name)?;
            println!("Departments: {}", departments.join(", "));
        }
        Command::LinkFace {
            persistent_id,
            roll_number,
        } => {
            directory.link_face(persistent_id, &roll_number)?;
            println!("Face #{persistent_id} linked to {roll_number}");
        }
        Command::SelfLink { roll_number } => {
            let id = directory.link_new_face_for_student(&roll_number)?;
            println!("Face #{id} linked to {roll_number}");
        }
        Command::BlockStudent { roll_number, actor } => {
            directory.set_actor(actor.actor.as_deref())?;
            let blocked = directory.toggle_student_block(&roll_number)?;
            println!("{roll_number} is now {}", block_label(blocked));
        }
        Command::DeleteStudent { roll_number, actor } => {
            directory.set_actor(actor.actor.as_deref())?;
            directory.delete_student(&roll_number)?;
            println!("Deleted student {roll_number}");
        }
        Command::BlockAdmin { id_number, actor } => {
            directory.set_actor(actor.actor.as_deref())?;
            let blocked = directory.toggle_admin_block(&id_number)?;
            println!("{id_number} is now {}", block_label(blocked));
        }
        Command::DeleteAdmin { id_number, actor } => {
            directory.set_actor(actor.actor.as_deref())?;
            directory.delete_admin(&id_number)?;
            println!("Deleted admin {id_number}");
        }
        Command::Attendance { roll_number } => {
            print_attendance(&directory, roll_number.as_deref())
        }
        Command::AuditLog => {
            for entry in directory.audit_log().iter().rev() {
                println!(
                    "{}  {:<16} {:<24} {}",
                    entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
                    entry.action,
                    entry.user,
                    entry.details
                );
            }
        }
        Command::ExportCsv { output } => {
            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!(
                    "attendance_report_{}.csv",
                    Local::now().format("%Y-%m-%d")
                ))
            });
            let rows = export_attendance(
                File::create(&output)?,
                directory.attendance(),
                directory.face_links(),
                directory.students(),
            )?;
            log::info!("Wrote {rows} rows to {}", output.display());
        }
    }

    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::load_or_default()?,
    };
    Ok(config)
}

fn open_directory(
    data_dir: Option<PathBuf>,
) -> Result<DirectoryService, Box<dyn std::error::Error>> {
    let dir = match data_dir {
        Some(dir) => dir,
        None => JsonFileStore::default_dir()?,
    };
    log::debug!("Using data directory {}", dir.display());
    let mut directory = DirectoryService::load(Box::new(JsonFileStore::new(dir)))?;
    if directory.ensure_default_principal()? {
        log::info!("Created default principal account");
    }
    Ok(directory)
}

fn build_detector(
    args: &DetectorArgs,
) -> Result<Box<dyn DetectionService>, Box<dyn std::error::Error>> {
    match (&args.detector_url, &args.script) {
        (_, Some(script)) => Ok(Box::new(ScriptedDetectionService::from_file(script)?)),
        (Some(url), None) => Ok(Box::new(HttpDetectionService::new(url)?)),
        (None, None) => Err("either --detector-url or --script is required".into()),
    }
}

fn read_photo(path: Option<&Path>) -> Result<Option<String>, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(None);
    };
    let bytes =
        fs::read(path).map_err(|e| format!("failed to read photo {}: {e}", path.display()))?;
    Ok(Some(STANDARD.encode(bytes)))
}

fn block_label(blocked: bool) -> &'static str {
    if blocked {
        "blocked"
    } else {
        "unblocked"
    }
}

fn print_attendance(directory: &DirectoryService, roll_number: Option<&str>) {
    let records = match roll_number {
        Some(roll) => directory.student_attendance(roll),
        None => {
            let mut all = directory.attendance().to_vec();
            all.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
            all
        }
    };
    for record in records {
        let who = directory
            .face_links()
            .get(&record.persistent_id)
            .map(String::as_str)
            .unwrap_or("unlinked");
        println!(
            "{}  #{:<4} {:<12} {}",
            record.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            record.persistent_id,
            who,
            record.emotion
        );
    }
}

fn run_analyze(
    frames: &Path,
    detector: &DetectorArgs,
    paused: bool,
    config: &EngineConfig,
    directory: DirectoryService,
) -> Result<(), Box<dyn std::error::Error>> {
    let detector = build_detector(detector)?;
    let scheduler = CaptureScheduler::from_config(config, Box::new(StdoutCycleLogger::new()));
    let session = SessionMonitor::from_config(config);
    let source = Box::new(ImageDirectorySource::new(frames));
    let polling = PollingLoop::new(scheduler, session, source, directory, config.poll_interval());

    let (command_tx, command_rx) = unbounded();
    let (event_tx, event_rx) = unbounded();
    if !paused {
        command_tx.send(LoopCommand::StartCapture)?;
    }
    spawn_stdin_reader(command_tx);
    let printer = spawn_event_printer(event_rx);

    let directory = polling.run(detector, command_rx, event_tx)?;
    if printer.join().is_err() {
        log::warn!("Event printer panicked");
    }
    log::info!(
        "Analyzer stopped with {} attendance records on file",
        directory.attendance().len()
    );
    Ok(())
}

fn spawn_stdin_reader(commands: Sender<LoopCommand>) {
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = match line.trim() {
                "" => continue,
                "start" => LoopCommand::StartCapture,
                "stop" => LoopCommand::StopCapture,
                "quit" | "exit" => LoopCommand::Shutdown,
                other => match other.parse::<ActivitySignal>() {
                    Ok(signal) => LoopCommand::Activity(signal),
                    Err(e) => {
                        eprintln!("{e}");
                        continue;
                    }
                },
            };
            let shutdown = command == LoopCommand::Shutdown;
            if commands.send(command).is_err() || shutdown {
                break;
            }
        }
    });
}

fn spawn_event_printer(events: Receiver<LoopEvent>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        for event in events {
            match event {
                LoopEvent::Published(result) => match serde_json::to_string(&result) {
                    Ok(json) => println!("{json}"),
                    Err(e) => log::warn!("Failed to serialize result: {e}"),
                },
                LoopEvent::Alert(alert) => eprintln!("[alert] {alert}"),
                LoopEvent::AlertCleared => eprintln!("[alert] cleared"),
                LoopEvent::SessionWarning(secs) => {
                    eprintln!("[session] logging out in {secs}s without activity")
                }
                LoopEvent::LoggedOut => eprintln!("[session] logged out"),
            }
        }
    })
}

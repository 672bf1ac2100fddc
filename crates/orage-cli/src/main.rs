//! `orage` — CLI principal du runtime Orage
//!
//! Ici on fait uniquement : parsing d'arguments, initialisation (logger,
//! couleur), et délégation à `orage_cli` (lib).

#![forbid(unsafe_code)]

use std::{path::PathBuf, process::ExitCode};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use orage_cli as cli; // notre lib interne (src/lib.rs)

// ──────────────────────────── CLI (clap) ────────────────────────────

#[derive(Debug, Parser)]
#[command(name = "orage", version, about = "Orage CLI — charger, inspecter et invoquer des modules ORBC", long_about = None)]
struct Opt {
    /// Augmente la verbosité (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    /// Mode silencieux (casse la verbosité)
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,

    /// Force la couleur (si la feature `color` est compilée)
    #[arg(long = "color", value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,

    /// Sous-commandes
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ColorChoice {
    Auto,
    Always,
    Never,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Charger un module ORBC, préparer device + entrées, invoquer une fonction
    Run {
        /// Module bytecode (.orbc) (ou - pour stdin)
        module: PathBuf,
        /// Driver HAL à résoudre par nom
        #[arg(long, default_value = "host")]
        driver: String,
        /// Fonction exportée à invoquer
        #[arg(short, long, default_value = "main")]
        function: String,
        /// Argument d'entrée `type=v` ou `[forme]xtype=[v,...]` (répétable)
        #[arg(short, long = "input", action = ArgAction::Append)]
        inputs: Vec<String>,
        /// Afficher le temps d'exécution
        #[arg(long)]
        time: bool,
    },

    /// Inspecter un module ORBC (header, exports, tailles, CRC)
    Inspect {
        /// Module bytecode (.orbc) (ou - pour stdin)
        module: PathBuf,
        /// Sortie JSON (pretty-printed) au lieu du texte
        #[arg(long)]
        json: bool,
    },

    /// Parser puis réimprimer des arguments (vérifie l'aller-retour)
    Parse {
        /// Arguments `type=v` ou `[forme]xtype=[v,...]`
        inputs: Vec<String>,
    },
}

// ──────────────────────────── Hooks (adapteurs) ────────────────────────────

fn make_hooks() -> cli::Hooks {
    let mut h = cli::Hooks::default();

    // Exécution — À RACCORDER à ta VM
    // Exemple d'API attendue :
    // h.run = Some(|module, hal, inputs| ma_vm::invoke(module, hal, inputs));
    h.run = None;

    h
}

// ──────────────────────────── Logger / Verbosité ────────────────────────────

fn init_telemetry(verbose: u8, quiet: bool) {
    #[cfg(feature = "trace")]
    {
        let level = if quiet {
            "error"
        } else {
            match verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        };
        std::env::set_var(
            "RUST_LOG",
            std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string()),
        );
        cli::init_logger();
    }
    #[cfg(not(feature = "trace"))]
    {
        let _ = (verbose, quiet);
    }
}

fn init_color(choice: ColorChoice) {
    // `owo-colors` détecte tout seul le TTY ; on force via les env vars.
    match choice {
        ColorChoice::Auto => { /* par défaut */ },
        ColorChoice::Always => {
            std::env::set_var("CLICOLOR_FORCE", "1");
            std::env::remove_var("NO_COLOR");
        },
        ColorChoice::Never => {
            std::env::set_var("NO_COLOR", "1");
            std::env::remove_var("CLICOLOR_FORCE");
        },
    }
}

// ──────────────────────────── main ────────────────────────────

fn main() -> ExitCode {
    if let Err(e) = real_main() {
        eprintln!("error: {:#}", e);
        return ExitCode::from(1);
    }
    ExitCode::from(0)
}

fn real_main() -> Result<()> {
    let opt = Opt::parse();

    init_color(opt.color);
    init_telemetry(opt.verbose, opt.quiet);

    let hooks = make_hooks();

    use cli::{Command as C, InspectTask, ParseTask, RunTask};

    let command = match opt.cmd {
        Command::Run { module, driver, function, inputs, time } => {
            C::Run(RunTask { module, driver, function, inputs, time })
        },
        Command::Inspect { module, json } => C::Inspect(InspectTask { module, json }),
        Command::Parse { inputs } => C::Parse(ParseTask { inputs }),
    };

    let code = cli::execute(command, &hooks).context("échec d'exécution de la commande")?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

//! orage-cli — bibliothèque interne du binaire `orage`
//!
//! But : fournir une API **propre, testable et réutilisable** pour le CLI
//! sans mélanger la logique d'E/S et le parsing d'arguments (laisse ça à
//! `main.rs`).
//!
//! Points clés :
//! - Les six utilitaires de marshalling : lecture fichier, parsing/impression
//!   de listes de variants, fabrique de device, module HAL, chargeur ORBC
//! - Hook pour brancher ta VM (l'interpréteur reste un collaborateur externe)
//! - Traces (`feature = "trace"`) et couleurs (`feature = "color"`) optionnelles

#![deny(unused_must_use)]
#![forbid(unsafe_code)]

use std::{
    fs,
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{anyhow, Context, Result};

use orage_hal::{Allocator, Device, DriverRegistry, HalResult, HostAllocator};
use orage_vm::{
    BytecodeModule, FormatError, HalModule, Module, ParseError, PrintError, VariantList, VmResult,
};

#[cfg(feature = "color")]
use owo_colors::OwoColorize;

// ───────────────────────────── Utilitaires de marshalling ─────────────────────────────

/// Lit le contenu complet d'un fichier (tout-ou-rien).
///
/// Le chemin `-` lit l'entrée standard. Échoue avec l'erreur d'E/S
/// d'origine si le chemin n'existe pas ou n'est pas lisible.
pub fn get_file_contents(path: impl AsRef<Path>) -> io::Result<Vec<u8>> {
    let path = path.as_ref();
    if path.as_os_str() == "-" {
        let mut buf = Vec::new();
        io::stdin().read_to_end(&mut buf)?;
        return Ok(buf);
    }
    fs::read(path)
}

/// Parse des arguments texte en liste de variants (scalaires + buffers).
///
/// La mémoire des buffers vient de `allocator` ; la liste rendue est
/// possédante, rien à libérer à la main. Une seule fonction couvre tous
/// les conteneurs de chaînes.
pub fn parse_to_variant_list<I, S>(
    allocator: &dyn Allocator,
    inputs: I,
) -> std::result::Result<VariantList, ParseError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    VariantList::parse(allocator, inputs)
}

/// Imprime une liste de variants, un élément par ligne.
///
/// Scalaires nus, buffers au format `[forme]xtype=[valeurs]` re-parsable.
pub fn print_variant_list(
    list: &VariantList,
    out: &mut dyn io::Write,
) -> std::result::Result<(), PrintError> {
    list.write_to(out)
}

/// Résout `driver_name` dans le registre et crée son device par défaut.
pub fn create_device(registry: &DriverRegistry, driver_name: &str) -> HalResult<Device> {
    registry.create_device(driver_name)
}

/// Enveloppe un device déjà créé dans un module exécutable par la VM.
pub fn create_hal_module(device: Device) -> VmResult<HalModule> {
    HalModule::create(device)
}

/// Interprète un blob opaque comme un module bytecode ORBC.
pub fn load_bytecode_module(bytes: &[u8]) -> std::result::Result<BytecodeModule, FormatError> {
    BytecodeModule::from_bytes(bytes)
}

// ───────────────────────────── Types publics ─────────────────────────────

/// Représente une commande haut-niveau (sans parsing CLI — réservé à main.rs).
#[derive(Clone, Debug)]
pub enum Command {
    /// Charger un module, préparer device + entrées, déléguer l'exécution.
    Run(RunTask),
    /// Inspecter un module ORBC (header, exports, tailles).
    Inspect(InspectTask),
    /// Parser puis réimprimer des arguments (surface aller-retour).
    Parse(ParseTask),
}

#[derive(Clone, Debug, Default)]
pub struct RunTask {
    pub module: PathBuf,      // chemin ou - (stdin)
    pub driver: String,       // nom de driver HAL
    pub function: String,     // fonction exportée à invoquer
    pub inputs: Vec<String>,  // arguments `type=v` / `[forme]xtype=[v…]`
    pub time: bool,           // afficher le timing
}

#[derive(Clone, Debug, Default)]
pub struct InspectTask {
    pub module: PathBuf,
    pub json: bool,
}

#[derive(Clone, Debug, Default)]
pub struct ParseTask {
    pub inputs: Vec<String>,
}

/// Hooks pour brancher tes implémentations.
///
/// L'exécution du bytecode appartient à la VM externe : tant que `run`
/// n'est pas raccordé, `orage run` prépare tout puis s'arrête proprement.
#[derive(Clone, Default)]
pub struct Hooks {
    pub run: Option<RunFn>,
}

/// VM : (module, module HAL, entrées) → sorties.
pub type RunFn = fn(&BytecodeModule, &HalModule, &VariantList) -> Result<VariantList>;

// ───────────────────────────── Initialisation ─────────────────────────────

/// Initialise le logger selon la feature `trace`.
pub fn init_logger() {
    #[cfg(feature = "trace")]
    {
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .format_timestamp_secs()
            .try_init();
    }
}

// ───────────────────────────── Exécution ─────────────────────────────

/// Exécute une commande avec les hooks fournis. Retourne un code de sortie.
pub fn execute(cmd: Command, hooks: &Hooks) -> Result<i32> {
    match cmd {
        Command::Run(t) => run_entry(t, hooks),
        Command::Inspect(t) => {
            inspect_entry(t)?;
            Ok(0)
        },
        Command::Parse(t) => {
            parse_entry(t)?;
            Ok(0)
        },
    }
}

fn run_entry(task: RunTask, hooks: &Hooks) -> Result<i32> {
    let bytes = get_file_contents(&task.module)
        .with_context(|| format!("lecture du module: {}", task.module.display()))?;
    let module = load_bytecode_module(&bytes).context("chargement du bytecode")?;

    let registry = DriverRegistry::with_defaults();
    let device = create_device(&registry, &task.driver)
        .with_context(|| format!("drivers disponibles: {}", registry.names().join(", ")))?;
    #[cfg(feature = "trace")]
    log::info!("device `{}` créé via le driver `{}`", device.name(), task.driver);

    let hal = create_hal_module(device).context("création du module HAL")?;

    let inputs = parse_to_variant_list(hal.device().allocator(), &task.inputs)
        .context("parsing des entrées")?;

    let sig = module.signature(&task.function).ok_or_else(|| {
        anyhow!("fonction `{}` absente du module `{}`", task.function, Module::name(&module))
    })?;
    if usize::from(sig.argc) != inputs.len() {
        anyhow::bail!(
            "`{}` attend {} argument(s), {} fourni(s)",
            task.function,
            sig.argc,
            inputs.len()
        );
    }

    let runner = hooks
        .run
        .ok_or_else(|| anyhow!("exécution indisponible (hook `run` manquant — branchez la VM)"))?;

    let start = Instant::now();
    let outputs = runner(&module, &hal, &inputs)?;
    let elapsed = start.elapsed();

    let mut w = BufWriter::new(io::stdout().lock());
    print_variant_list(&outputs, &mut w).context("impression des sorties")?;
    w.flush()?;

    status_ok("RUN", &format!("{}::{}", Module::name(&module), task.function));
    if task.time {
        status_info("TIME", &format!("run: {} ms", elapsed.as_millis()));
    }
    Ok(0)
}

fn inspect_entry(task: InspectTask) -> Result<()> {
    let bytes = get_file_contents(&task.module)
        .with_context(|| format!("lecture du module: {}", task.module.display()))?;
    let module = load_bytecode_module(&bytes).context("chargement du bytecode")?;

    let mut w = BufWriter::new(io::stdout().lock());
    if task.json {
        let exports: Vec<_> = module
            .exports
            .iter()
            .map(|f| {
                serde_json::json!({
                    "name": f.name,
                    "argc": f.argc,
                    "retc": f.retc,
                })
            })
            .collect();
        let payload = serde_json::json!({
            "name": module.name,
            "version": module.version,
            "exports": exports,
            "rodata_len": module.rodata.len(),
            "code_len": module.code.len(),
            "crc32": module.crc32,
        });
        writeln!(w, "{}", serde_json::to_string_pretty(&payload)?)?;
    } else {
        writeln!(w, "module  : {}", module.name)?;
        writeln!(w, "version : {}", module.version)?;
        writeln!(w, "crc32   : {:#010x}", module.crc32)?;
        writeln!(w, "rodata  : {} octet(s)", module.rodata.len())?;
        writeln!(w, "code    : {} octet(s)", module.code.len())?;
        writeln!(w, "exports :")?;
        for f in &module.exports {
            writeln!(w, "  {f}")?;
        }
    }
    w.flush()?;
    Ok(())
}

fn parse_entry(task: ParseTask) -> Result<()> {
    let list =
        parse_to_variant_list(&HostAllocator, &task.inputs).context("parsing des arguments")?;
    let mut w = BufWriter::new(io::stdout().lock());
    print_variant_list(&list, &mut w).context("impression des arguments")?;
    w.flush()?;
    Ok(())
}

// ───────────────────────────── Sorties jolies ─────────────────────────────

fn status_ok(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.green().bold(), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

fn status_info(tag: &str, msg: &str) {
    #[cfg(feature = "color")]
    {
        eprintln!("{} {}", tag.blue().bold(), msg);
    }
    #[cfg(not(feature = "color"))]
    {
        eprintln!("{} {}", tag, msg);
    }
}

// ───────────────────────────── Tests ─────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use orage_vm::OrbcBuilder;
    use pretty_assertions::assert_eq;
    use std::io::Write as _;

    fn fake_run(
        _module: &BytecodeModule,
        _hal: &HalModule,
        inputs: &VariantList,
    ) -> Result<VariantList> {
        // jouet : renvoie les entrées telles quelles
        Ok(inputs.clone())
    }

    #[test]
    fn file_contents_exact_bytes() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"\x00\x01orage\xFF").unwrap();
        let bytes = get_file_contents(f.path()).unwrap();
        assert_eq!(bytes, b"\x00\x01orage\xFF");
    }

    #[test]
    fn file_contents_missing_path() {
        let err = get_file_contents("/nonexistent/orage.orbc").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn parse_then_print_roundtrip() {
        let list = parse_to_variant_list(&HostAllocator, ["[2,2]xi32=[1,2,3,4]", "i32=42"])
            .unwrap();
        let mut out = Vec::new();
        print_variant_list(&list, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[2,2]xi32=[1,2,3,4]\n42\n");
    }

    #[test]
    fn create_device_unknown_driver() {
        let registry = DriverRegistry::with_defaults();
        assert!(create_device(&registry, "nonexistent_driver").is_err());
    }

    fn module_file(argc: u16) -> tempfile::NamedTempFile {
        let bytes = OrbcBuilder::new("demo")
            .export("main", argc, 1)
            .code(vec![0xAA])
            .to_bytes();
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(&bytes).unwrap();
        f
    }

    #[test]
    fn run_pipeline_with_hook() {
        let f = module_file(1);
        let hooks = Hooks { run: Some(fake_run) };
        let task = RunTask {
            module: f.path().to_path_buf(),
            driver: "host".to_string(),
            function: "main".to_string(),
            inputs: vec!["i32=7".to_string()],
            time: false,
        };
        let code = execute(Command::Run(task), &hooks).unwrap();
        assert_eq!(code, 0);
    }

    #[test]
    fn run_without_hook_fails_cleanly() {
        let f = module_file(0);
        let task = RunTask {
            module: f.path().to_path_buf(),
            driver: "host".to_string(),
            function: "main".to_string(),
            inputs: Vec::new(),
            time: false,
        };
        let err = execute(Command::Run(task), &Hooks::default()).unwrap_err();
        assert!(err.to_string().contains("hook `run` manquant"));
    }

    #[test]
    fn run_checks_arity_against_signature() {
        let f = module_file(2);
        let hooks = Hooks { run: Some(fake_run) };
        let task = RunTask {
            module: f.path().to_path_buf(),
            driver: "host".to_string(),
            function: "main".to_string(),
            inputs: vec!["i32=7".to_string()],
            time: false,
        };
        let err = execute(Command::Run(task), &hooks).unwrap_err();
        assert!(err.to_string().contains("attend 2 argument(s)"));
    }

    #[test]
    fn run_unknown_function() {
        let f = module_file(0);
        let hooks = Hooks { run: Some(fake_run) };
        let task = RunTask {
            module: f.path().to_path_buf(),
            driver: "host".to_string(),
            function: "absente".to_string(),
            inputs: Vec::new(),
            time: false,
        };
        let err = execute(Command::Run(task), &hooks).unwrap_err();
        assert!(err.to_string().contains("absente"));
    }
}

//! Initialization driver: variables, then prehooks, template rendering,
//! hooks, and posthooks, aborting on the first failure.

use std::path::PathBuf;

use tracing::debug;

use crate::error::Error;
use crate::{hooks, render, vars};

/// Filesystem locations the driver operates on.
#[derive(Debug, Clone)]
pub struct InitPaths {
    pub templates_root: PathBuf,
    pub jinja_root: PathBuf,
    pub variables_file: PathBuf,
    /// Whether the variables path was overridden on the command line;
    /// only the default location may be silently absent.
    pub variables_explicit: bool,
    pub hooks_dir: PathBuf,
    pub dest_root: PathBuf,
}

/// Run the full initialization sequence. Nothing after the first failing
/// stage runs, so the child is never launched on a broken setup.
pub fn run(paths: &InitPaths) -> Result<(), Error> {
    let mut vars = vars::load(&paths.variables_file, paths.variables_explicit)?;

    let units = hooks::discover(&paths.hooks_dir)?;
    debug!(units = units.len(), "hook units discovered");

    hooks::run_prehooks(&units, &mut vars)?;

    if paths.templates_root.is_dir() {
        render::render_tree(&paths.templates_root, &paths.jinja_root, &paths.dest_root, &vars)?;
    } else {
        debug!(root = %paths.templates_root.display(), "no templates root, skipping render");
    }

    // The variable space is frozen from here on.
    let vars = vars;
    hooks::run_hooks(&units, &vars)?;
    hooks::run_posthooks(&units, &vars)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    struct Fixture {
        _tmp: tempfile::TempDir,
        paths: InitPaths,
        log: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempfile::tempdir().expect("tempdir");
            let root = tmp.path();
            let paths = InitPaths {
                templates_root: root.join("templates"),
                jinja_root: root.join("jinja"),
                variables_file: root.join("variables.yml"),
                variables_explicit: false,
                hooks_dir: root.join("hooks"),
                dest_root: root.join("rootfs"),
            };
            std::fs::create_dir_all(&paths.hooks_dir).expect("mkdir hooks");
            std::fs::create_dir_all(&paths.dest_root).expect("mkdir rootfs");
            let log = root.join("order.log");
            Fixture {
                _tmp: tmp,
                paths,
                log,
            }
        }

        fn add_unit(&self, name: &str, phases: &[&str]) {
            let dir = self.paths.hooks_dir.join(name);
            std::fs::create_dir(&dir).expect("mkdir unit");
            for phase in phases {
                let script = format!(
                    "#!/bin/sh\ncat > /dev/null\necho '{name} {phase}' >> {}\n",
                    self.log.display()
                );
                write_executable(&dir.join(phase), &script);
            }
        }

        fn log_lines(&self) -> Vec<String> {
            std::fs::read_to_string(&self.log)
                .unwrap_or_default()
                .lines()
                .map(str::to_string)
                .collect()
        }
    }

    fn write_executable(path: &Path, contents: &str) {
        std::fs::write(path, contents).expect("write script");
        let mut perms = std::fs::metadata(path).expect("stat").permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms).expect("chmod");
    }

    #[test]
    fn stages_run_in_order_across_units() {
        let fx = Fixture::new();
        fx.add_unit("10-a", &["prehook", "hook", "posthook"]);
        fx.add_unit("20-b", &["prehook", "hook", "posthook"]);

        run(&fx.paths).expect("init");

        assert_eq!(
            fx.log_lines(),
            [
                "10-a prehook",
                "20-b prehook",
                "10-a hook",
                "20-b hook",
                "10-a posthook",
                "20-b posthook",
            ]
        );
    }

    #[test]
    fn prehook_mutation_feeds_template_rendering() {
        let fx = Fixture::new();
        let unit = fx.paths.hooks_dir.join("mutator");
        std::fs::create_dir(&unit).expect("mkdir unit");
        write_executable(
            &unit.join("prehook"),
            "#!/bin/sh\ncat > /dev/null\necho 'greeting: bonjour'\n",
        );
        std::fs::create_dir_all(&fx.paths.templates_root).expect("mkdir templates");
        std::fs::write(
            fx.paths.templates_root.join("motd"),
            "say {{ greeting }}\n",
        )
        .expect("write template");

        run(&fx.paths).expect("init");

        let out = std::fs::read_to_string(fx.paths.dest_root.join("motd")).expect("read motd");
        assert_eq!(out, "say bonjour\n");
    }

    #[test]
    fn variables_file_feeds_template_rendering() {
        let fx = Fixture::new();
        std::fs::write(&fx.paths.variables_file, "port: 8080\n").expect("write vars");
        std::fs::create_dir_all(&fx.paths.templates_root).expect("mkdir templates");
        std::fs::write(
            fx.paths.templates_root.join("listen.conf"),
            "listen {{ port }}\n",
        )
        .expect("write template");

        run(&fx.paths).expect("init");

        let out =
            std::fs::read_to_string(fx.paths.dest_root.join("listen.conf")).expect("read conf");
        assert_eq!(out, "listen 8080\n");
    }

    #[test]
    fn failing_prehook_stops_before_rendering() {
        let fx = Fixture::new();
        let unit = fx.paths.hooks_dir.join("broken");
        std::fs::create_dir(&unit).expect("mkdir unit");
        write_executable(&unit.join("prehook"), "#!/bin/sh\nexit 1\n");
        std::fs::create_dir_all(&fx.paths.templates_root).expect("mkdir templates");
        std::fs::write(fx.paths.templates_root.join("motd"), "hello\n").expect("write template");

        let err = run(&fx.paths).unwrap_err();
        assert!(matches!(err, Error::HookError { .. }));
        assert!(!fx.paths.dest_root.join("motd").exists());
    }

    #[test]
    fn missing_templates_root_is_skipped() {
        let fx = Fixture::new();
        // No templates directory at all; the driver still completes.
        run(&fx.paths).expect("init");
    }

    #[test]
    fn explicit_missing_variables_file_aborts() {
        let mut fx = Fixture::new();
        fx.paths.variables_explicit = true;
        let err = run(&fx.paths).unwrap_err();
        assert!(matches!(err, Error::VariablesMissing(_)));
    }
}

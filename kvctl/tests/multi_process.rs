use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::{tempdir, TempDir};

struct Store {
    dir: TempDir,
    config: PathBuf,
}

impl Store {
    fn new() -> Result<Store, Box<dyn Error>> {
        let dir = tempdir()?;
        let config = dir.path().join("kvctl.toml");
        let content = format!(
            "[shmem]\n\
            data_dir = \"{}\"\n\
            store_name = \"multi-process\"\n",
            dir.path().display()
        );
        fs::write(&config, content)?;
        let store = Store { dir, config };
        store.ok(&["create"])?;
        Ok(store)
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_kvctl"));
        cmd.arg("--config").arg(&self.config).args(args);
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<Output, Box<dyn Error>> {
        Ok(self.command(args).output()?)
    }

    fn ok(&self, args: &[&str]) -> Result<Vec<String>, Box<dyn Error>> {
        let output = self.run(args)?;
        if !output.status.success() {
            return Err(format!(
                "kvctl {:?} failed: {}",
                args,
                String::from_utf8_lossy(&output.stderr)
            )
            .into());
        }
        Ok(String::from_utf8(output.stdout)?.lines().map(str::to_string).collect())
    }

    fn link(&self) -> PathBuf {
        Path::new(self.dir.path()).join("multi-process")
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        let _ = self.run(&["destroy"]);
    }
}

#[test]
fn values_written_by_one_process_are_read_by_another() -> Result<(), Box<dyn Error>> {
    let store = Store::new()?;
    store.ok(&["write", "k", "v1"])?;
    store.ok(&["write", "k", "v2"])?;
    assert_eq!(store.ok(&["read", "k"])?, vec!["v1"]);
    assert_eq!(store.ok(&["read", "k"])?, vec!["v2"]);
    assert_eq!(store.ok(&["read-all", "k"])?, vec!["v1", "v2"]);
    Ok(())
}

#[test]
fn missing_key_exits_with_failure() -> Result<(), Box<dyn Error>> {
    let store = Store::new()?;
    let output = store.run(&["read", "absent"])?;
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("not found"));
    Ok(())
}

#[test]
fn concurrent_writer_processes_are_linearized() -> Result<(), Box<dyn Error>> {
    let store = Store::new()?;
    let processes = 4;
    let per_process = 40;

    let children = (0..processes)
        .map(|p| {
            store
                .command(&[
                    "load",
                    "--count",
                    &per_process.to_string(),
                    "--key",
                    "shared",
                    "--prefix",
                    &format!("p{}", p),
                ])
                .spawn()
        })
        .collect::<Result<Vec<_>, _>>()?;
    for mut child in children {
        assert!(child.wait()?.success());
    }

    let values = store.ok(&["read-all", "shared"])?;
    assert_eq!(values.len(), processes * per_process);
    for p in 0..processes {
        let prefix = format!("p{}-", p);
        let mine: Vec<_> = values.iter().filter(|v| v.starts_with(&prefix)).cloned().collect();
        let expected: Vec<_> = (0..per_process).map(|i| format!("{}{}", prefix, i)).collect();
        assert_eq!(mine, expected);
    }
    Ok(())
}

#[test]
fn create_is_idempotent_and_destroy_removes_the_link() -> Result<(), Box<dyn Error>> {
    let store = Store::new()?;
    store.ok(&["write", "k", "kept"])?;
    store.ok(&["create"])?;
    assert_eq!(store.ok(&["read", "k"])?, vec!["kept"]);

    store.ok(&["destroy"])?;
    assert!(!store.link().exists());
    assert!(!store.run(&["read", "k"])?.status.success());
    // Nothing left to remove.
    store.ok(&["destroy"])?;
    Ok(())
}

use {
    std::{
        env,
        fs::File,
        io::prelude::*,
        path::Path,
    },
    git2::Repository,
    semver::Version,
};

#[derive(Debug, thiserror::Error)]
enum Error {
    #[error(transparent)] Io(#[from] std::io::Error),
    #[error(transparent)] Semver(#[from] semver::Error),
    #[error("missing environment variable {0}")]
    Env(&'static str),
    #[error("package version must not have pre-release or build metadata")]
    Prerelease,
}

fn commit_hash(manifest_dir: &Path) -> Option<String> {
    // builds from a source tarball have no repository to ask
    let repo = Repository::open(manifest_dir).ok()?;
    let commit = repo.head().ok()?.peel_to_commit().ok()?;
    Some(commit.id().to_string())
}

fn main() -> Result<(), Error> {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=migrations");
    let manifest_dir = env::var_os("CARGO_MANIFEST_DIR").ok_or(Error::Env("CARGO_MANIFEST_DIR"))?;
    let out_dir = env::var_os("OUT_DIR").ok_or(Error::Env("OUT_DIR"))?;
    let version = env!("CARGO_PKG_VERSION").parse::<Version>()?;
    if !version.pre.is_empty() || !version.build.is_empty() { return Err(Error::Prerelease) }
    let clap_version = match commit_hash(Path::new(&manifest_dir)) {
        Some(hash) => format!("{version} ({hash})"),
        None => version.to_string(),
    };
    let mut out_f = File::create(Path::new(&out_dir).join("version.rs"))?;
    writeln!(&mut out_f, "pub const CLAP_VERSION: &str = {clap_version:?};")?;
    Ok(())
}

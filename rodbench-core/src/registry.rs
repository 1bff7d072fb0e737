//! Benchmark Registry
//!
//! The write-once table of benchmarks a host can run. A registry is built
//! completely before serving starts and never changes afterwards, so the
//! protocol layer reads it without locking.
//!
//! Benchmarks are registered either explicitly through [`RegistryBuilder`]
//! or statically with `inventory` (see the `benchmark!` macro in the
//! `rodbench` crate) and collected by [`Registry::discover`].

use crate::Bencher;
use rodbench_ipc::BenchmarkEntry;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Shared benchmark body
pub type BenchFn = Arc<dyn Fn(&mut Bencher) + Send + Sync>;

/// A named benchmark body
#[derive(Clone)]
pub struct BenchmarkDescriptor {
    name: String,
    runner: BenchFn,
}

impl BenchmarkDescriptor {
    /// Benchmark name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute the body against `bencher`
    pub fn run(&self, bencher: &mut Bencher) {
        (self.runner)(bencher)
    }
}

impl fmt::Debug for BenchmarkDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BenchmarkDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Static registration submitted through `inventory`
#[derive(Debug, Clone, Copy)]
pub struct BenchmarkDef {
    /// Benchmark name
    pub name: &'static str,
    /// Benchmark body
    pub runner_fn: fn(&mut Bencher),
    /// Source file of the registration
    pub file: &'static str,
    /// Source line of the registration
    pub line: u32,
}

inventory::collect!(BenchmarkDef);

/// Anchor to prevent LTO from stripping inventory entries
#[used]
#[doc(hidden)]
pub static REGISTRY_ANCHOR: fn() = || {
    for _ in inventory::iter::<BenchmarkDef> {}
};

/// Invalid registrations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Names must be non-empty and free of whitespace, must not start with
    /// `#` (index syntax) and must not end in `-<digits>` (parallelism suffix)
    #[error("invalid benchmark name {0:?}")]
    InvalidName(String),
}

fn has_parallelism_suffix(name: &str) -> bool {
    match name.rsplit_once('-') {
        Some((_, tail)) => !tail.is_empty() && tail.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn validate_name(name: &str) -> Result<(), RegistryError> {
    if name.is_empty()
        || name.chars().any(char::is_whitespace)
        || name.starts_with('#')
        || has_parallelism_suffix(name)
    {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Immutable, ordered benchmark table. Indices are registration positions.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    benchmarks: Vec<BenchmarkDescriptor>,
}

/// Collects benchmarks for a [`Registry`]
#[derive(Default)]
pub struct RegistryBuilder {
    benchmarks: Vec<BenchmarkDescriptor>,
}

impl RegistryBuilder {
    /// Register a benchmark. Duplicate names are allowed; indices keep them apart.
    pub fn bench<F>(mut self, name: impl Into<String>, runner: F) -> Self
    where
        F: Fn(&mut Bencher) + Send + Sync + 'static,
    {
        self.benchmarks.push(BenchmarkDescriptor {
            name: name.into(),
            runner: Arc::new(runner),
        });
        self
    }

    /// Freeze the registry
    pub fn build(self) -> Result<Registry, RegistryError> {
        for bench in &self.benchmarks {
            validate_name(&bench.name)?;
        }
        Ok(Registry {
            benchmarks: self.benchmarks,
        })
    }
}

impl Registry {
    /// Start building a registry
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Collect every `inventory` registration linked into this binary,
    /// ordered by source location so indices are stable across runs.
    pub fn discover() -> Result<Registry, RegistryError> {
        let mut defs: Vec<&BenchmarkDef> = inventory::iter::<BenchmarkDef>.into_iter().collect();
        defs.sort_by(|a, b| (a.file, a.line, a.name).cmp(&(b.file, b.line, b.name)));

        defs.into_iter()
            .fold(Registry::builder(), |builder, def| {
                let runner = def.runner_fn;
                builder.bench(def.name, move |b: &mut Bencher| runner(b))
            })
            .build()
    }

    /// Number of benchmarks
    pub fn len(&self) -> usize {
        self.benchmarks.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.benchmarks.is_empty()
    }

    /// Benchmark at `index`
    pub fn get(&self, index: u32) -> Option<&BenchmarkDescriptor> {
        self.benchmarks.get(index as usize)
    }

    /// All benchmarks with their indices, in registration order
    pub fn iter(&self) -> impl Iterator<Item = (u32, &BenchmarkDescriptor)> {
        self.benchmarks
            .iter()
            .enumerate()
            .map(|(i, bench)| (i as u32, bench))
    }

    /// Indices of every benchmark called `name`
    pub fn indices_of<'a>(&'a self, name: &'a str) -> impl Iterator<Item = u32> + 'a {
        self.iter()
            .filter(move |(_, bench)| bench.name == name)
            .map(|(i, _)| i)
    }

    /// Protocol listing of every benchmark
    pub fn entries(&self) -> Vec<BenchmarkEntry> {
        self.iter()
            .map(|(index, bench)| BenchmarkEntry {
                index,
                name: bench.name.clone(),
            })
            .collect()
    }
}

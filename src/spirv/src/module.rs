use derivative::Derivative;
use itertools::Itertools;
use log::{debug, info};
use num_traits::FromPrimitive;
use spirv_headers as spv;

use crate::*;
use crate::decoder::Decoder;
use crate::diag::report;
use crate::reader::{normalize_words, words_from_bytes};

/// A fully reflected shader module. Immutable once built.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Module {
    #[derivative(Debug = "ignore")]
    graph: Graph,
    source_language: SourceLanguage,
    source_file: Option<String>,
    entry_points: Vec<EntryPoint>,
    descriptor_bindings: Vec<DescriptorBinding>,
    push_constants: Vec<PushConstantBlock>,
    diagnostics: Vec<Diagnostic>,
}

/// Parses a module from its binary encoding in either byte order.
pub fn parse_bytes(bytes: impl AsRef<[u8]>) -> Result<Module> {
    Module::from_words(&words_from_bytes(bytes.as_ref())?)
}

pub fn parse_words(words: &[u32]) -> Result<Module> {
    let words = normalize_words(words.to_vec())?;
    Module::from_words(&words)
}

impl Module {
    fn from_words(words: &[u32]) -> Result<Self> {
        let decoder = Decoder::new(words)?;
        let header = *decoder.header();
        debug!(
            "parsing SPIR-V {}.{} module: {} words, bound {}",
            header.version.0, header.version.1, words.len(), header.bound,
        );

        let mut diagnostics = Vec::new();
        if !header.is_supported_version() {
            let (major, minor) = header.version;
            report(&mut diagnostics, Diagnostic::UnsupportedVersion { major, minor });
        }

        let graph = crate::graph::build(&decoder, &mut diagnostics)?;
        let reflection = crate::resolve::resolve(&graph, &mut diagnostics)?;

        let source_language = graph.source()
            .map_or(SourceLanguage::Unknown, |src| SourceLanguage::from_raw(src.language));
        let source_file = graph.source()
            .and_then(|src| src.file)
            .and_then(|file| graph.string(file))
            .map(ToOwned::to_owned);

        info!(
            "reflected module: {} entry point(s), {} binding(s), {} push constant block(s)",
            reflection.entry_points.len(),
            reflection.descriptor_bindings.len(),
            reflection.push_constants.len(),
        );

        Ok(Module {
            graph,
            source_language,
            source_file,
            entry_points: reflection.entry_points,
            descriptor_bindings: reflection.descriptor_bindings,
            push_constants: reflection.push_constants,
            diagnostics,
        })
    }

    /// The full symbol graph the reflection was derived from.
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn header(&self) -> &Header {
        self.graph.header()
    }

    pub fn version(&self) -> Version {
        self.header().version
    }

    pub fn generator(&self) -> u32 {
        self.header().generator
    }

    pub fn bound(&self) -> u32 {
        self.header().bound
    }

    /// Name of the first entry point.
    pub fn entry_point_name(&self) -> Option<&str> {
        self.entry_points.first().map(|entry| &entry.name[..])
    }

    /// Stage of the first entry point; empty if there is none.
    pub fn shader_stage(&self) -> ShaderStage {
        self.entry_points.first().map_or_else(ShaderStage::empty, |entry| entry.stage)
    }

    pub fn source_language(&self) -> SourceLanguage {
        self.source_language
    }

    pub fn source_language_version(&self) -> u32 {
        self.graph.source().map_or(0, |src| src.version)
    }

    pub fn source_file(&self) -> Option<&str> {
        self.source_file.as_deref()
    }

    /// Sorted by `(set, binding)`.
    pub fn enumerate_descriptor_bindings(&self) -> &[DescriptorBinding] {
        &self.descriptor_bindings
    }

    pub fn enumerate_descriptor_sets(&self) -> Vec<DescriptorSet<'_>> {
        let groups = self.descriptor_bindings.iter().group_by(|binding| binding.set);
        let sets = groups.into_iter()
            .map(|(set, bindings)| DescriptorSet { set, bindings: bindings.collect() })
            .collect();
        sets
    }

    pub fn get_descriptor_binding(&self, set: u32, binding: u32) -> Option<&DescriptorBinding> {
        self.descriptor_bindings.iter()
            .find(|b| (b.set, b.binding) == (set, binding))
    }

    /// Bindings statically used by `entry`.
    pub fn descriptor_bindings_for<'a>(&'a self, entry: &'a EntryPoint) ->
        impl Iterator<Item = &'a DescriptorBinding> + 'a
    {
        self.descriptor_bindings.iter()
            .filter(move |binding| entry.uses(binding.variable))
    }

    pub fn enumerate_entry_points(&self) -> &[EntryPoint] {
        &self.entry_points
    }

    pub fn get_entry_point(&self, name: &str) -> Option<&EntryPoint> {
        self.entry_points.iter().find(|entry| entry.name == name)
    }

    pub fn enumerate_push_constants(&self) -> &[PushConstantBlock] {
        &self.push_constants
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Declared capabilities with their raw values; unknown values map to
    /// `None`.
    pub fn capabilities(&self) -> impl Iterator<Item = (u32, Option<spv::Capability>)> + '_ {
        self.graph.capabilities().iter().map(|&cap| (cap, spv::Capability::from_u32(cap)))
    }

    pub fn extensions(&self) -> &[String] {
        self.graph.extensions()
    }

    pub fn ext_inst_imports(&self) -> &[(Id, ExtInstSet)] {
        self.graph.ext_inst_imports()
    }
}

#[derive(Debug)]
enum State {
    Uninitialized,
    Parsed(Box<Module>),
    Destroyed,
}

impl Default for State {
    fn default() -> Self {
        Self::Uninitialized
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum HandleState {
    Uninitialized,
    Parsed,
    Destroyed,
}

/// An owning handle with an explicit lifecycle for callers that manage
/// module lifetimes by hand. Accessors on a handle that is not `Parsed`
/// panic; `try_module` reports the state instead.
#[derive(Debug, Default)]
pub struct ModuleHandle {
    state: State,
}

macro_rules! forward {
    ($($name:ident($($arg:ident: $ty:ty),*) -> $ret:ty;)*) => {
        $(
            pub fn $name(&self, $($arg: $ty),*) -> $ret {
                self.module().$name($($arg),*)
            }
        )*
    }
}

impl ModuleHandle {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn parse(bytes: impl AsRef<[u8]>) -> Result<Self> {
        let module = parse_bytes(bytes)?;
        Ok(Self { state: State::Parsed(Box::new(module)) })
    }

    /// Parses into an uninitialized handle. On failure the handle stays
    /// uninitialized.
    pub fn load(&mut self, bytes: impl AsRef<[u8]>) -> Result<()> {
        match self.state {
            State::Uninitialized => {},
            _ => return Err(ErrorKind::InvalidState.into()),
        }
        let module = parse_bytes(bytes)?;
        self.state = State::Parsed(Box::new(module));
        Ok(())
    }

    /// Releases the module. Destroying twice is an error.
    pub fn destroy(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Destroyed) {
            State::Destroyed => Err(ErrorKind::DoubleDestroy.into()),
            _ => Ok(()),
        }
    }

    pub fn state(&self) -> HandleState {
        match self.state {
            State::Uninitialized => HandleState::Uninitialized,
            State::Parsed(_) => HandleState::Parsed,
            State::Destroyed => HandleState::Destroyed,
        }
    }

    pub fn try_module(&self) -> Result<&Module> {
        match &self.state {
            State::Parsed(module) => Ok(&**module),
            State::Uninitialized => Err(ErrorKind::Uninitialized.into()),
            State::Destroyed => Err(ErrorKind::UseAfterDestroy.into()),
        }
    }

    /// Panics unless the handle is parsed.
    pub fn module(&self) -> &Module {
        match self.try_module() {
            Ok(module) => module,
            Err(e) => panic!("{}", e),
        }
    }

    forward! {
        entry_point_name() -> Option<&str>;
        shader_stage() -> ShaderStage;
        source_language() -> SourceLanguage;
        enumerate_descriptor_bindings() -> &[DescriptorBinding];
        enumerate_entry_points() -> &[EntryPoint];
        enumerate_push_constants() -> &[PushConstantBlock];
        get_entry_point(name: &str) -> Option<&EntryPoint>;
        diagnostics() -> &[Diagnostic];
    }
}

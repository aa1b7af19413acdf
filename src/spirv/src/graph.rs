//! Id-keyed symbol graph built in two passes: every node is declared on
//! the first pass and cross-references are linked and checked on the
//! second, so forward references need no special casing.
use derivative::Derivative;
use fnv::{FnvHashMap as HashMap, FnvHashSet as HashSet};
use log::{debug, trace};
use num_traits::FromPrimitive;
use smallvec::SmallVec;
use spirv_headers as spv;

use crate::*;
use crate::decoder::{Decoder, Instruction};
use crate::diag::report;
use crate::node::{self, AnyNode};
use crate::reader::Header;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Decoration {
    /// Raw `Decoration` enumerant.
    pub kind: u32,
    pub operands: SmallVec<[u32; 2]>,
}

impl Decoration {
    pub fn kind(&self) -> Option<spv::Decoration> {
        spv::Decoration::from_u32(self.kind)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Decorations(Vec<Decoration>);

static NO_DECORATIONS: Decorations = Decorations(Vec::new());

impl Decorations {
    pub fn iter(&self) -> impl Iterator<Item = &Decoration> + '_ {
        self.0.iter()
    }

    pub fn get(&self, kind: spv::Decoration) -> Option<&Decoration> {
        self.0.iter().find(|deco| deco.kind == kind as u32)
    }

    pub fn has(&self, kind: spv::Decoration) -> bool {
        self.get(kind).is_some()
    }

    /// First literal operand of a decoration.
    pub fn value(&self, kind: spv::Decoration) -> Option<u32> {
        self.get(kind).and_then(|deco| deco.operands.first().copied())
    }

    fn push(&mut self, deco: Decoration) {
        self.0.push(deco);
    }

    fn extend(&mut self, other: &Decorations) {
        self.0.extend(other.0.iter().cloned());
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StructMember {
    pub ty: Id,
    pub name: Option<String>,
    pub offset: Option<u32>,
    pub decorations: Decorations,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TypeNode {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
    Vector { component: Id, count: u32 },
    Matrix { column: Id, count: u32 },
    Image(Box<ImageTraits>),
    Sampler,
    SampledImage { image: Id },
    /// `length` is `None` when the length constant is not a literal.
    Array { elem: Id, length_id: Id, length: Option<u32> },
    RuntimeArray { elem: Id },
    Struct { members: Vec<StructMember> },
    Opaque { name: String },
    /// Top-level acceleration structure handle for ray tracing.
    AccelerationStructure,
    RayQuery,
    Pointer { storage_class: u32, pointee: Id },
    Function { ret: Id, params: Vec<Id> },
}

impl TypeNode {
    /// Types this type is composed of by value. Pointers and function
    /// signatures only refer to other types.
    fn components(&self) -> SmallVec<[Id; 4]> {
        match self {
            Self::Vector { component, .. } => smallvec::smallvec![*component],
            Self::Matrix { column, .. } => smallvec::smallvec![*column],
            Self::SampledImage { image } => smallvec::smallvec![*image],
            Self::Array { elem, .. } | Self::RuntimeArray { elem } =>
                smallvec::smallvec![*elem],
            Self::Struct { members } => members.iter().map(|m| m.ty).collect(),
            _ => SmallVec::new(),
        }
    }

    /// Type ids that must be declared for the module to link. A pointee
    /// is only resolved once a variable of the pointer type is reflected.
    fn references(&self) -> SmallVec<[Id; 4]> {
        match self {
            Self::Image(image) => smallvec::smallvec![image.sampled_type],
            Self::Function { ret, params } =>
                std::iter::once(*ret).chain(params.iter().copied()).collect(),
            _ => self.components(),
        }
    }

    pub fn is_struct(&self) -> bool {
        matches!(self, Self::Struct { .. })
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConstantValue {
    Bool(bool),
    /// Literal words, lowest order first.
    Scalar(Vec<u32>),
    Composite(Vec<Id>),
    Null,
    /// Samplers, undefined values and specialization expressions.
    Other,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Constant {
    pub ty: Id,
    pub value: ConstantValue,
    /// Specialization constant; `value` is the default.
    pub spec: bool,
}

impl Constant {
    /// Low word of a scalar literal.
    pub fn as_u32(&self) -> Option<u32> {
        match &self.value {
            ConstantValue::Scalar(words) => words.first().copied(),
            ConstantValue::Bool(b) => Some(*b as u32),
            ConstantValue::Null => Some(0),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Variable {
    /// Pointer type of the variable.
    pub ty: Id,
    pub storage_class: u32,
    pub initializer: Option<Id>,
}

impl Variable {
    pub fn storage_class(&self) -> Option<spv::StorageClass> {
        spv::StorageClass::from_u32(self.storage_class)
    }
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Function {
    /// Root ids of every pointer the body reads or writes through.
    pub accessed: HashSet<Id>,
    pub calls: Vec<Id>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExecutionModeDecl {
    pub mode: u32,
    pub operands: Vec<u32>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EntryPointDecl {
    pub execution_model: u32,
    pub function: Id,
    pub name: String,
    pub interface: Vec<Id>,
    pub modes: Vec<ExecutionModeDecl>,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SourceDecl {
    pub language: u32,
    pub version: u32,
    pub file: Option<Id>,
}

/// Every node of a module, keyed by result id.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Graph {
    header: Header,
    names: HashMap<Id, String>,
    member_names: HashMap<(Id, u32), String>,
    decorations: HashMap<Id, Decorations>,
    member_decorations: HashMap<(Id, u32), Decorations>,
    types: HashMap<Id, TypeNode>,
    constants: HashMap<Id, Constant>,
    variables: HashMap<Id, Variable>,
    /// Global variables in declaration order.
    variable_order: Vec<Id>,
    strings: HashMap<Id, String>,
    entry_points: Vec<EntryPointDecl>,
    #[derivative(Debug = "ignore")]
    functions: HashMap<Id, Function>,
    ext_inst_imports: Vec<(Id, ExtInstSet)>,
    capabilities: Vec<u32>,
    extensions: Vec<String>,
    source: Option<SourceDecl>,
    source_extensions: Vec<String>,
    memory_model: Option<(u32, u32)>,
}

impl Graph {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn name(&self, id: Id) -> Option<&str> {
        self.names.get(&id).map(|s| &s[..])
    }

    pub fn member_name(&self, ty: Id, member: u32) -> Option<&str> {
        self.member_names.get(&(ty, member)).map(|s| &s[..])
    }

    pub fn decorations(&self, id: Id) -> &Decorations {
        self.decorations.get(&id).unwrap_or(&NO_DECORATIONS)
    }

    pub fn member_decorations(&self, ty: Id, member: u32) -> &Decorations {
        self.member_decorations.get(&(ty, member)).unwrap_or(&NO_DECORATIONS)
    }

    pub fn get_type(&self, id: Id) -> Option<&TypeNode> {
        self.types.get(&id)
    }

    /// Like `get_type` but a missing type is an error.
    pub fn resolve_type(&self, id: Id) -> Result<&TypeNode> {
        self.get_type(id).ok_or_else(|| Error::for_id(ErrorKind::UnresolvedType, id))
    }

    pub fn constant(&self, id: Id) -> Option<&Constant> {
        self.constants.get(&id)
    }

    pub fn variable(&self, id: Id) -> Option<&Variable> {
        self.variables.get(&id)
    }

    /// Global variables in declaration order.
    pub fn variables(&self) -> impl Iterator<Item = (Id, &Variable)> + '_ {
        self.variable_order.iter().map(move |&id| (id, &self.variables[&id]))
    }

    /// Pointee of a variable's pointer type.
    pub fn variable_pointee(&self, id: Id) -> Result<Id> {
        let var = self.variable(id)
            .ok_or_else(|| Error::for_id(ErrorKind::UnresolvedId, id))?;
        match self.resolve_type(var.ty)? {
            &TypeNode::Pointer { pointee, .. } => Ok(pointee),
            _ => Err(Error::for_id(ErrorKind::MalformedInstruction, id)),
        }
    }

    pub fn string(&self, id: Id) -> Option<&str> {
        self.strings.get(&id).map(|s| &s[..])
    }

    pub fn entry_points(&self) -> &[EntryPointDecl] {
        &self.entry_points
    }

    pub fn function(&self, id: Id) -> Option<&Function> {
        self.functions.get(&id)
    }

    pub fn ext_inst_imports(&self) -> &[(Id, ExtInstSet)] {
        &self.ext_inst_imports
    }

    pub fn capabilities(&self) -> &[u32] {
        &self.capabilities
    }

    pub fn extensions(&self) -> &[String] {
        &self.extensions
    }

    pub fn source(&self) -> Option<&SourceDecl> {
        self.source.as_ref()
    }

    pub fn source_extensions(&self) -> &[String] {
        &self.source_extensions
    }

    /// `(addressing model, memory model)`
    pub fn memory_model(&self) -> Option<(u32, u32)> {
        self.memory_model
    }

    /// Global variables reachable from `function` through its call graph,
    /// ascending.
    pub fn reachable_variables(&self, function: Id) -> Vec<Id> {
        let mut seen = HashSet::default();
        let mut stack = vec![function];
        let mut vars = Vec::new();
        while let Some(f) = stack.pop() {
            if !seen.insert(f) { continue; }
            let func = try_opt!(self.functions.get(&f), continue);
            vars.extend(func.accessed.iter()
                .filter(|id| self.variables.contains_key(*id)));
            stack.extend(func.calls.iter().copied());
        }
        vars.sort_unstable();
        vars.dedup();
        vars
    }
}

#[derive(Debug, Default)]
struct FunctionBuilder {
    id: Id,
    func: Function,
    /// Maps derived pointers to the pointer they were derived from.
    derived: HashMap<Id, Id>,
}

impl FunctionBuilder {
    fn root(&self, mut ptr: Id) -> Id {
        // Bounded in case of a malformed self-referential chain.
        for _ in 0..=self.derived.len() {
            match self.derived.get(&ptr) {
                Some(&base) => ptr = base,
                None => break,
            }
        }
        ptr
    }

    fn touch(&mut self, ptr: Id) {
        let root = self.root(ptr);
        self.func.accessed.insert(root);
    }

    fn scan(&mut self, inst: &Instruction<'_>) {
        let op = try_opt!(inst.op(), return);
        let words = inst.operand_words();
        for &pos in node::pointer_operands(op) {
            if let Some(&ptr) = words.get(pos) {
                self.touch(ptr);
            }
        }
        if node::DERIVED_POINTER_OPS.contains(&op) {
            if let (Some(&result), Some(&base)) = (words.get(1), words.get(2)) {
                self.derived.insert(result, base);
            }
        }
    }
}

#[derive(Debug)]
struct UnhandledOp {
    opcode: u16,
    offset: usize,
    count: usize,
}

#[derive(Debug)]
enum GroupApplication {
    Ids { group: Id, targets: Vec<Id> },
    Members { group: Id, targets: Vec<(Id, u32)> },
}

#[derive(Debug)]
struct GraphBuilder {
    graph: Graph,
    defined: HashSet<Id>,
    /// Results of function bodies and of skipped instructions.
    results: HashSet<Id>,
    current: Option<FunctionBuilder>,
    groups: HashSet<Id>,
    group_applications: Vec<GroupApplication>,
    pending_modes: Vec<(Id, ExecutionModeDecl)>,
    unhandled: Vec<UnhandledOp>,
    diagnostics: Vec<Diagnostic>,
}

/// Builds the graph of a decoded module, appending diagnostics.
pub(crate) fn build(decoder: &Decoder<'_>, diagnostics: &mut Vec<Diagnostic>)
    -> Result<Graph>
{
    let mut builder = GraphBuilder::new(*decoder.header());
    for inst in decoder.instructions() {
        builder.declare(&inst?)?;
    }
    let graph = builder.link(diagnostics)?;
    debug!(
        "built graph: {} types, {} variables, {} functions",
        graph.types.len(), graph.variables.len(), graph.functions.len(),
    );
    Ok(graph)
}

impl GraphBuilder {
    fn new(header: Header) -> Self {
        Self {
            graph: Graph {
                header,
                names: Default::default(),
                member_names: Default::default(),
                decorations: Default::default(),
                member_decorations: Default::default(),
                types: Default::default(),
                constants: Default::default(),
                variables: Default::default(),
                variable_order: Vec::new(),
                strings: Default::default(),
                entry_points: Vec::new(),
                functions: Default::default(),
                ext_inst_imports: Vec::new(),
                capabilities: Vec::new(),
                extensions: Vec::new(),
                source: None,
                source_extensions: Vec::new(),
                memory_model: None,
            },
            defined: Default::default(),
            results: Default::default(),
            current: None,
            groups: Default::default(),
            group_applications: Vec::new(),
            pending_modes: Vec::new(),
            unhandled: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    fn define(&mut self, id: Id, offset: usize) -> Result<()> {
        if id == 0 || id >= self.graph.header.bound {
            return Err(Error::at(ErrorKind::MalformedInstruction, offset));
        }
        if !self.defined.insert(id) {
            return Err(Error::for_id(ErrorKind::DuplicateId, id));
        }
        Ok(())
    }

    fn skip(&mut self, inst: &Instruction<'_>) {
        if let Some(id) = node::result_id(inst) {
            self.results.insert(id);
        }
        if inst.op().map_or(false, |op| node::IGNORED_OPS.contains(&op)) {
            return;
        }
        let opcode = inst.opcode();
        match self.unhandled.iter_mut().find(|op| op.opcode == opcode) {
            Some(op) => op.count += 1,
            None => self.unhandled.push(UnhandledOp {
                opcode,
                offset: inst.offset(),
                count: 1,
            }),
        }
    }

    // Pass one
    fn declare(&mut self, inst: &Instruction<'_>) -> Result<()> {
        trace!("declare: {:?} at {}", inst.op(), inst.offset());
        let offset = inst.offset();
        if self.current.is_some() {
            return self.declare_in_function(inst);
        }
        let node = match AnyNode::parse(inst)? {
            Some(node) => node,
            None => {
                self.skip(inst);
                return Ok(());
            },
        };
        let graph = &mut self.graph;
        match node {
            AnyNode::Source(src) => {
                if graph.source.is_none() {
                    graph.source = Some(SourceDecl {
                        language: src.language,
                        version: src.version,
                        file: src.file,
                    });
                }
            },
            AnyNode::SourceExtension(ext) =>
                graph.source_extensions.push(ext.extension),
            AnyNode::Name(name) => {
                graph.names.entry(name.target).or_insert(name.name);
            },
            AnyNode::MemberName(name) => {
                graph.member_names.entry((name.ty, name.member)).or_insert(name.name);
            },
            AnyNode::String(s) => {
                self.define(s.result, offset)?;
                self.graph.strings.insert(s.result, s.value);
            },
            AnyNode::Extension(ext) => graph.extensions.push(ext.name),
            AnyNode::ExtInstImport(import) => {
                self.define(import.result, offset)?;
                let set = ExtInstSet::from_name(&import.name);
                if !set.is_known() {
                    report(&mut self.diagnostics, Diagnostic::UnknownExtInstSet {
                        id: import.result,
                        name: import.name,
                    });
                }
                self.graph.ext_inst_imports.push((import.result, set));
            },
            AnyNode::MemoryModel(model) => {
                graph.memory_model = Some((model.addressing_model, model.memory_model));
            },
            AnyNode::EntryPoint(entry) => graph.entry_points.push(EntryPointDecl {
                execution_model: entry.execution_model,
                function: entry.function,
                name: entry.name,
                interface: entry.interface,
                modes: Vec::new(),
            }),
            AnyNode::ExecutionMode(mode) | AnyNode::ExecutionModeId(mode) =>
                self.pending_modes.push((mode.entry_point, ExecutionModeDecl {
                    mode: mode.mode,
                    operands: mode.operands,
                })),
            AnyNode::Capability(cap) => graph.capabilities.push(cap.capability),
            AnyNode::TypeVoid(ty) => self.declare_type(ty.result, offset, TypeNode::Void)?,
            AnyNode::TypeBool(ty) => self.declare_type(ty.result, offset, TypeNode::Bool)?,
            AnyNode::TypeInt(ty) => self.declare_type(ty.result, offset, TypeNode::Int {
                width: ty.width,
                signed: ty.signed,
            })?,
            AnyNode::TypeFloat(ty) =>
                self.declare_type(ty.result, offset, TypeNode::Float { width: ty.width })?,
            AnyNode::TypeVector(ty) => self.declare_type(ty.result, offset, TypeNode::Vector {
                component: ty.component_type,
                count: ty.component_count,
            })?,
            AnyNode::TypeMatrix(ty) => self.declare_type(ty.result, offset, TypeNode::Matrix {
                column: ty.column_type,
                count: ty.column_count,
            })?,
            AnyNode::TypeImage(ty) => {
                let image = ImageTraits {
                    sampled_type: ty.sampled_type,
                    dim: ty.dim,
                    depth: ty.depth,
                    arrayed: ty.arrayed,
                    multisampled: ty.multisampled,
                    sampled: ty.sampled,
                    format: ty.format,
                    access_qualifier: ty.access_qualifier,
                };
                self.declare_type(ty.result, offset, TypeNode::Image(Box::new(image)))?;
            },
            AnyNode::TypeSampler(ty) =>
                self.declare_type(ty.result, offset, TypeNode::Sampler)?,
            AnyNode::TypeSampledImage(ty) => self.declare_type(
                ty.result, offset, TypeNode::SampledImage { image: ty.image },
            )?,
            AnyNode::TypeArray(ty) => self.declare_type(ty.result, offset, TypeNode::Array {
                elem: ty.elem,
                length_id: ty.length,
                length: None,
            })?,
            AnyNode::TypeRuntimeArray(ty) => self.declare_type(
                ty.result, offset, TypeNode::RuntimeArray { elem: ty.elem },
            )?,
            AnyNode::TypeStruct(ty) => {
                let members = ty.members.iter().map(|&ty| StructMember {
                    ty,
                    name: None,
                    offset: None,
                    decorations: Decorations::default(),
                }).collect();
                self.declare_type(ty.result, offset, TypeNode::Struct { members })?;
            },
            AnyNode::TypeOpaque(ty) =>
                self.declare_type(ty.result, offset, TypeNode::Opaque { name: ty.name })?,
            AnyNode::TypeAccelerationStructureNV(ty) =>
                self.declare_type(ty.result, offset, TypeNode::AccelerationStructure)?,
            AnyNode::TypeRayQueryProvisionalKHR(ty) =>
                self.declare_type(ty.result, offset, TypeNode::RayQuery)?,
            AnyNode::TypePointer(ty) => self.declare_type(ty.result, offset, TypeNode::Pointer {
                storage_class: ty.storage_class,
                pointee: ty.target,
            })?,
            // The pointer itself is declared later by OpTypePointer.
            AnyNode::TypeForwardPointer(_) => {},
            AnyNode::TypeFunction(ty) => self.declare_type(ty.result, offset, TypeNode::Function {
                ret: ty.ret,
                params: ty.params,
            })?,
            AnyNode::ConstantTrue(c) => self.declare_bool(c, true, false, offset)?,
            AnyNode::ConstantFalse(c) => self.declare_bool(c, false, false, offset)?,
            AnyNode::SpecConstantTrue(c) => self.declare_bool(c, true, true, offset)?,
            AnyNode::SpecConstantFalse(c) => self.declare_bool(c, false, true, offset)?,
            AnyNode::Constant(c) => self.declare_constant(
                c.result, offset, c.ty, ConstantValue::Scalar(c.value), false,
            )?,
            AnyNode::SpecConstant(c) => self.declare_constant(
                c.result, offset, c.ty, ConstantValue::Scalar(c.value), true,
            )?,
            AnyNode::ConstantComposite(c) => self.declare_constant(
                c.result, offset, c.ty, ConstantValue::Composite(c.constituents), false,
            )?,
            AnyNode::SpecConstantComposite(c) => self.declare_constant(
                c.result, offset, c.ty, ConstantValue::Composite(c.constituents), true,
            )?,
            AnyNode::ConstantNull(c) =>
                self.declare_constant(c.result, offset, c.ty, ConstantValue::Null, false)?,
            AnyNode::ConstantSampler(c) | AnyNode::Undef(c) =>
                self.declare_constant(c.result, offset, c.ty, ConstantValue::Other, false)?,
            AnyNode::SpecConstantOp(c) =>
                self.declare_constant(c.result, offset, c.ty, ConstantValue::Other, true)?,
            AnyNode::Variable(var) => {
                self.define(var.result, offset)?;
                self.graph.variables.insert(var.result, Variable {
                    ty: var.ty,
                    storage_class: var.storage_class,
                    initializer: var.initializer,
                });
                self.graph.variable_order.push(var.result);
            },
            AnyNode::Function(func) => {
                self.define(func.result, offset)?;
                self.current = Some(FunctionBuilder { id: func.result, ..Default::default() });
            },
            AnyNode::FunctionEnd(_) | AnyNode::FunctionCall(_) =>
                return Err(Error::at(ErrorKind::MalformedInstruction, offset)),
            AnyNode::Decorate(deco) | AnyNode::DecorateId(deco) => {
                graph.decorations.entry(deco.target).or_default().push(Decoration {
                    kind: deco.decoration,
                    operands: deco.operands.into(),
                });
            },
            AnyNode::MemberDecorate(deco) => {
                graph.member_decorations.entry((deco.ty, deco.member)).or_default()
                    .push(Decoration {
                        kind: deco.decoration,
                        operands: deco.operands.into(),
                    });
            },
            AnyNode::DecorationGroup(group) => {
                self.define(group.result, offset)?;
                self.groups.insert(group.result);
            },
            AnyNode::GroupDecorate(group) =>
                self.group_applications.push(GroupApplication::Ids {
                    group: group.group,
                    targets: group.targets,
                }),
            AnyNode::GroupMemberDecorate(group) => {
                if group.targets.len() % 2 != 0 {
                    return Err(Error::at(ErrorKind::MalformedInstruction, offset));
                }
                let targets = group.targets.chunks(2).map(|c| (c[0], c[1])).collect();
                self.group_applications.push(GroupApplication::Members {
                    group: group.group,
                    targets,
                });
            },
        }
        Ok(())
    }

    fn declare_in_function(&mut self, inst: &Instruction<'_>) -> Result<()> {
        if let Some(id) = node::result_id(inst) {
            self.results.insert(id);
        }
        let node = match inst.op() {
            Some(spv::Op::FunctionEnd)
                | Some(spv::Op::FunctionCall)
                | Some(spv::Op::Variable)
                | Some(spv::Op::Function) => AnyNode::parse(inst)?,
            _ => None,
        };
        match node {
            Some(AnyNode::FunctionEnd(_)) => {
                let FunctionBuilder { id, func, .. } = try_opt!(self.current.take(), return Ok(()));
                self.graph.functions.insert(id, func);
            },
            Some(AnyNode::FunctionCall(call)) => {
                let current = try_opt!(self.current.as_mut(), return Ok(()));
                current.func.calls.push(call.function);
                // Globals passed by pointer count as used by the caller.
                for &arg in call.arguments.iter() {
                    current.touch(arg);
                }
            },
            Some(AnyNode::Variable(var)) => self.define(var.result, inst.offset())?,
            Some(AnyNode::Function(_)) =>
                return Err(Error::at(ErrorKind::MalformedInstruction, inst.offset())),
            _ => if let Some(current) = self.current.as_mut() {
                current.scan(inst);
            },
        }
        Ok(())
    }

    fn declare_type(&mut self, id: Id, offset: usize, ty: TypeNode) -> Result<()> {
        self.define(id, offset)?;
        self.graph.types.insert(id, ty);
        Ok(())
    }

    fn declare_constant(
        &mut self,
        id: Id,
        offset: usize,
        ty: Id,
        value: ConstantValue,
        spec: bool,
    ) -> Result<()> {
        self.define(id, offset)?;
        self.graph.constants.insert(id, Constant { ty, value, spec });
        Ok(())
    }

    fn declare_bool(
        &mut self,
        c: node::ConstantBool,
        value: bool,
        spec: bool,
        offset: usize,
    ) -> Result<()> {
        self.declare_constant(c.result, offset, c.ty, ConstantValue::Bool(value), spec)
    }

    // Pass two
    fn link(mut self, diagnostics: &mut Vec<Diagnostic>) -> Result<Graph> {
        if let Some(func) = self.current.as_ref() {
            return Err(Error::for_id(ErrorKind::MalformedInstruction, func.id));
        }

        for op in std::mem::take(&mut self.unhandled) {
            report(&mut self.diagnostics, Diagnostic::UnhandledOpcode {
                opcode: op.opcode,
                offset: op.offset,
                count: op.count,
            });
        }

        self.apply_groups()?;
        self.check_decoration_targets()?;
        self.link_types()?;
        self.check_cycles()?;
        self.check_variables()?;
        self.link_entry_points()?;
        self.check_functions()?;

        if let Some(file) = self.graph.source.as_ref().and_then(|src| src.file) {
            if !self.graph.strings.contains_key(&file) {
                return Err(Error::for_id(ErrorKind::UnresolvedId, file));
            }
        }

        diagnostics.append(&mut self.diagnostics);
        Ok(self.graph)
    }

    fn apply_groups(&mut self) -> Result<()> {
        let graph = &mut self.graph;
        for app in std::mem::take(&mut self.group_applications) {
            let group = match app {
                GroupApplication::Ids { group, .. }
                    | GroupApplication::Members { group, .. } => group,
            };
            if !self.groups.contains(&group) {
                return Err(Error::for_id(ErrorKind::UnresolvedId, group));
            }
            let decos = graph.decorations.get(&group).cloned().unwrap_or_default();
            match app {
                GroupApplication::Ids { targets, .. } => for target in targets {
                    graph.decorations.entry(target).or_default().extend(&decos);
                },
                GroupApplication::Members { targets, .. } => for target in targets {
                    graph.member_decorations.entry(target).or_default().extend(&decos);
                },
            }
        }
        Ok(())
    }

    fn check_decoration_targets(&self) -> Result<()> {
        let targets = self.graph.decorations.keys()
            .chain(self.graph.member_decorations.keys().map(|(id, _)| id));
        for &target in targets {
            if !self.defined.contains(&target) && !self.results.contains(&target) {
                return Err(Error::for_id(ErrorKind::UnresolvedId, target));
            }
        }
        Ok(())
    }

    fn link_types(&mut self) -> Result<()> {
        let graph = &mut self.graph;
        let mut ids: Vec<Id> = graph.types.keys().copied().collect();
        ids.sort_unstable();
        for &id in ids.iter() {
            for target in graph.types[&id].references() {
                if !graph.types.contains_key(&target) {
                    return Err(Error::for_id(ErrorKind::UnresolvedType, target));
                }
            }
        }

        for id in ids {
            let ty = try_opt!(graph.types.get_mut(&id), continue);
            match ty {
                TypeNode::Array { length_id, length, .. } => {
                    let constant = graph.constants.get(&*length_id)
                        .ok_or_else(|| Error::for_id(ErrorKind::UnresolvedId, *length_id))?;
                    *length = match constant.value {
                        ConstantValue::Scalar(_) => constant.as_u32(),
                        _ => None,
                    };
                    if length.is_none() {
                        report(&mut self.diagnostics,
                            Diagnostic::NonLiteralArrayLength { array: id });
                    }
                },
                TypeNode::Struct { members } => {
                    for (i, member) in members.iter_mut().enumerate() {
                        let key = (id, i as u32);
                        member.name = graph.member_names.get(&key).cloned();
                        if let Some(decos) = graph.member_decorations.get(&key) {
                            member.offset = decos.value(spv::Decoration::Offset);
                            member.decorations = decos.clone();
                        }
                    }
                },
                _ => {},
            }
        }
        Ok(())
    }

    fn check_cycles(&self) -> Result<()> {
        #[derive(Clone, Copy, Eq, PartialEq)]
        enum Mark { Visiting, Done }

        let types = &self.graph.types;
        let mut marks: HashMap<Id, Mark> = Default::default();
        let mut ids: Vec<Id> = types.keys().copied().collect();
        ids.sort_unstable();
        for root in ids {
            if marks.contains_key(&root) { continue; }
            // Iterative DFS; `true` entries are post-order exits.
            let mut stack = vec![(root, false)];
            while let Some((id, exit)) = stack.pop() {
                if exit {
                    marks.insert(id, Mark::Done);
                    continue;
                }
                match marks.get(&id) {
                    Some(Mark::Done) => continue,
                    Some(Mark::Visiting) =>
                        return Err(Error::for_id(ErrorKind::CyclicType, id)),
                    None => {},
                }
                marks.insert(id, Mark::Visiting);
                stack.push((id, true));
                for child in types[&id].components() {
                    match marks.get(&child) {
                        Some(Mark::Visiting) =>
                            return Err(Error::for_id(ErrorKind::CyclicType, child)),
                        Some(Mark::Done) => {},
                        None => stack.push((child, false)),
                    }
                }
            }
        }
        Ok(())
    }

    fn check_variables(&self) -> Result<()> {
        for (id, var) in self.graph.variables() {
            match self.graph.resolve_type(var.ty)? {
                TypeNode::Pointer { .. } => {},
                _ => return Err(Error::for_id(ErrorKind::MalformedInstruction, id)),
            }
        }
        Ok(())
    }

    fn link_entry_points(&mut self) -> Result<()> {
        let graph = &mut self.graph;
        for entry in graph.entry_points.iter() {
            if !graph.functions.contains_key(&entry.function) {
                return Err(Error::for_id(ErrorKind::UnresolvedId, entry.function));
            }
            for &var in entry.interface.iter() {
                if !graph.variables.contains_key(&var) {
                    return Err(Error::for_id(ErrorKind::UnresolvedId, var));
                }
            }
        }
        for (function, mode) in std::mem::take(&mut self.pending_modes) {
            let mut found = false;
            for entry in graph.entry_points.iter_mut()
                .filter(|entry| entry.function == function)
            {
                entry.modes.push(mode.clone());
                found = true;
            }
            if !found {
                return Err(Error::for_id(ErrorKind::UnresolvedId, function));
            }
        }
        Ok(())
    }

    fn check_functions(&self) -> Result<()> {
        for func in self.graph.functions.values() {
            for &callee in func.calls.iter() {
                if !self.graph.functions.contains_key(&callee) {
                    return Err(Error::for_id(ErrorKind::UnresolvedId, callee));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    fn build_words(words: &[u32]) -> Result<(Graph, Vec<Diagnostic>)> {
        let decoder = Decoder::new(words)?;
        let mut diags = Vec::new();
        let graph = build(&decoder, &mut diags)?;
        Ok((graph, diags))
    }

    #[test]
    fn forward_references() {
        let mut asm = Assembler::new();
        let uint = asm.id();
        let strct = asm.id();
        let ptr = asm.id();
        let var = asm.id();
        // Use before declaration is legal in the graph
        asm.name(var, "ubo");
        asm.member_name(strct, 0, "x");
        asm.member_decorate(strct, 0, spv::Decoration::Offset, &[0]);
        asm.inst(spv::Op::TypeStruct, &[strct, uint]);
        asm.inst(spv::Op::TypeInt, &[uint, 32, 0]);
        asm.inst(spv::Op::TypePointer, &[ptr, spv::StorageClass::Uniform as u32, strct]);
        asm.variable_with_id(var, ptr, spv::StorageClass::Uniform);

        let (graph, diags) = build_words(&asm.words()).unwrap();
        assert!(diags.is_empty());
        assert_eq!(graph.name(var), Some("ubo"));
        assert_eq!(graph.variable_pointee(var).unwrap(), strct);
        match graph.get_type(strct).unwrap() {
            TypeNode::Struct { members } => {
                assert_eq!(members[0].name.as_deref(), Some("x"));
                assert_eq!(members[0].offset, Some(0));
            },
            other => panic!("{:?}", other),
        }
    }

    #[test]
    fn unresolved_type() {
        let mut asm = Assembler::new();
        let strct = asm.id();
        let missing = asm.id();
        asm.inst(spv::Op::TypeStruct, &[strct, missing]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedType);
        assert_eq!(err.context(), Some(Context::Id(missing)));
    }

    #[test]
    fn duplicate_id() {
        let mut asm = Assembler::new();
        let id = asm.id();
        asm.inst(spv::Op::TypeVoid, &[id]);
        asm.inst(spv::Op::TypeBool, &[id]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DuplicateId);
    }

    #[test]
    fn id_out_of_bound() {
        let mut asm = Assembler::new();
        let bound = asm.bound();
        asm.inst(spv::Op::TypeVoid, &[bound + 3]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInstruction);
        assert_eq!(err.context(), Some(Context::Offset(5)));
    }

    #[test]
    fn cyclic_struct() {
        let mut asm = Assembler::new();
        let a = asm.id();
        let b = asm.id();
        let len = asm.id();
        let uint = asm.type_int(32, false);
        asm.inst(spv::Op::Constant, &[uint, len, 2]);
        asm.inst(spv::Op::TypeStruct, &[a, b]);
        asm.inst(spv::Op::TypeArray, &[b, a, len]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CyclicType);
    }

    #[test]
    fn pointer_breaks_cycle() {
        let mut asm = Assembler::new();
        let node = asm.id();
        let ptr = asm.id();
        // PhysicalStorageBuffer
        let storage = 5349;
        asm.inst(spv::Op::TypeForwardPointer, &[ptr, storage]);
        asm.inst(spv::Op::TypeStruct, &[node, ptr]);
        asm.inst(spv::Op::TypePointer, &[ptr, storage, node]);
        assert!(build_words(&asm.words()).is_ok());
    }

    #[test]
    fn decoration_groups() {
        let mut asm = Assembler::new();
        let group = asm.id();
        let a = asm.id();
        let b = asm.id();
        asm.decorate(group, spv::Decoration::DescriptorSet, &[1]);
        asm.inst(spv::Op::DecorationGroup, &[group]);
        asm.inst(spv::Op::GroupDecorate, &[group, a, b]);
        asm.inst(spv::Op::TypeFloat, &[a, 32]);
        asm.inst(spv::Op::TypeFloat, &[b, 64]);
        let (graph, _) = build_words(&asm.words()).unwrap();
        assert_eq!(graph.decorations(a).value(spv::Decoration::DescriptorSet), Some(1));
        assert_eq!(graph.decorations(b).value(spv::Decoration::DescriptorSet), Some(1));

        // Applying an undeclared group
        let mut asm = Assembler::new();
        let group = asm.id();
        let a = asm.id();
        asm.inst(spv::Op::GroupDecorate, &[group, a]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedId);
    }

    #[test]
    fn dangling_decoration() {
        let mut asm = Assembler::new();
        let bound = asm.bound();
        asm.decorate(bound + 10, spv::Decoration::Binding, &[0]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedId);
    }

    #[test]
    fn undefined_decoration_target() {
        // The target is below the bound but nothing defines it.
        let mut asm = Assembler::new();
        let target = asm.id();
        asm.type_void();
        asm.decorate(target, spv::Decoration::Binding, &[3]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedId);
        assert_eq!(err.context(), Some(Context::Id(target)));
    }

    #[test]
    fn function_result_decoration() {
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let ptr = asm.type_pointer(spv::StorageClass::Private, float);
        let var = asm.variable(ptr, spv::StorageClass::Private);
        let mut loaded = 0;
        asm.void_function(|asm, _| {
            loaded = asm.id();
            asm.inst(spv::Op::Load, &[float, loaded, var]);
        });
        asm.decorate(loaded, spv::Decoration::RelaxedPrecision, &[]);
        let (graph, _) = build_words(&asm.words()).unwrap();
        assert!(graph.decorations(loaded).has(spv::Decoration::RelaxedPrecision));
    }

    #[test]
    fn ray_query_pointer() {
        // OpTypeRayQueryKHR %1; OpTypePointer Private %1
        let mut asm = Assembler::new();
        let query = asm.id();
        asm.inst(spv::Op::TypeRayQueryProvisionalKHR, &[query]);
        let tlas = asm.id();
        asm.inst(spv::Op::TypeAccelerationStructureNV, &[tlas]);
        let ptr = asm.type_pointer(spv::StorageClass::Private, query);
        asm.variable(ptr, spv::StorageClass::Private);
        let (graph, diags) = build_words(&asm.words()).unwrap();
        assert!(diags.is_empty());
        assert_eq!(graph.resolve_type(query).unwrap(), &TypeNode::RayQuery);
        assert_eq!(graph.resolve_type(tlas).unwrap(), &TypeNode::AccelerationStructure);
    }

    #[test]
    fn unmodelled_pointee() {
        // OpTypeEvent is skipped, so only a use of the pointee would fail.
        let mut asm = Assembler::new();
        let event = asm.id();
        asm.inst(spv::Op::TypeEvent, &[event]);
        let ptr = asm.type_pointer(spv::StorageClass::Private, event);
        let var = asm.variable(ptr, spv::StorageClass::Private);
        let (graph, _) = build_words(&asm.words()).unwrap();
        assert_eq!(graph.variable_pointee(var).unwrap(), event);
        let err = graph.resolve_type(event).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedType);
    }

    #[test]
    fn unhandled_opcodes_fold() {
        let mut asm = Assembler::new();
        asm.raw(0x7ffe, &[1, 2]);
        asm.raw(0x7ffe, &[3]);
        asm.inst(spv::Op::Nop, &[]);
        let (_, diags) = build_words(&asm.words()).unwrap();
        assert_eq!(diags, vec![Diagnostic::UnhandledOpcode {
            opcode: 0x7ffe,
            offset: 5,
            count: 2,
        }]);
    }

    #[test]
    fn static_usage() {
        let mut asm = Assembler::new();
        asm.shader_preamble();
        let float = asm.type_float(32);
        let ptr = asm.type_pointer(spv::StorageClass::Private, float);
        let used = asm.variable(ptr, spv::StorageClass::Private);
        let via_chain = asm.variable(ptr, spv::StorageClass::Private);
        let unused = asm.variable(ptr, spv::StorageClass::Private);
        let helper = asm.void_function(|asm, _| {
            let chain = asm.id();
            let value = asm.id();
            asm.inst(spv::Op::AccessChain, &[ptr, chain, via_chain]);
            asm.inst(spv::Op::Load, &[float, value, chain]);
        });
        let main = asm.void_function(|asm, void| {
            let value = asm.id();
            let ret = asm.id();
            asm.inst(spv::Op::Load, &[float, value, used]);
            asm.inst(spv::Op::FunctionCall, &[void, ret, helper]);
        });
        asm.entry_point(spv::ExecutionModel::Fragment, main, "main", &[]);

        let (graph, _) = build_words(&asm.words()).unwrap();
        let vars = graph.reachable_variables(main);
        assert_eq!(vars, vec![used, via_chain]);
        assert!(!vars.contains(&unused));
        assert_eq!(graph.reachable_variables(helper), vec![via_chain]);
    }

    #[test]
    fn unterminated_function() {
        let mut asm = Assembler::new();
        let void = asm.type_void();
        let fn_ty = asm.type_function(void, &[]);
        let f = asm.id();
        asm.inst(spv::Op::Function, &[void, f, 0, fn_ty]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInstruction);
    }

    #[test]
    fn missing_entry_function() {
        let mut asm = Assembler::new();
        let f = asm.id();
        asm.entry_point(spv::ExecutionModel::Vertex, f, "main", &[]);
        let err = build_words(&asm.words()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnresolvedId);
        assert_eq!(err.context(), Some(Context::Id(f)));
    }
}

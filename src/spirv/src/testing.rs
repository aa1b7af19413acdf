//! In-memory SPIR-V assembler for tests.
#![cfg(test)]
#![allow(dead_code)]
use fnv::FnvHashMap as HashMap;
use spirv_headers as spv;

const MAGIC: u32 = 0x07230203;

pub fn pack_string(s: &str) -> Vec<u32> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
    bytes.chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Appends instructions in whatever order a test wants. Ids are handed
/// out sequentially and the header bound tracks them.
#[derive(Debug)]
pub struct Assembler {
    next_id: u32,
    version: u32,
    body: Vec<u32>,
    scalars: HashMap<(u32, u32, u32), u32>,
    void: Option<u32>,
    void_fn: Option<u32>,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            version: 0x0001_0000,
            body: Vec::new(),
            scalars: Default::default(),
            void: None,
            void_fn: None,
        }
    }

    pub fn set_version(&mut self, major: u8, minor: u8) {
        self.version = ((major as u32) << 16) | ((minor as u32) << 8);
    }

    pub fn id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// The bound the header will declare if no more ids are allocated.
    pub fn bound(&self) -> u32 {
        self.next_id
    }

    pub fn raw(&mut self, opcode: u16, operands: &[u32]) {
        let count = operands.len() as u32 + 1;
        self.body.push((count << 16) | opcode as u32);
        self.body.extend_from_slice(operands);
    }

    pub fn inst(&mut self, op: spv::Op, operands: &[u32]) {
        self.raw(op as u16, operands);
    }

    /// An instruction with a literal string between other operands.
    pub fn inst_str(&mut self, op: spv::Op, before: &[u32], s: &str, after: &[u32]) {
        let mut operands = before.to_vec();
        operands.extend(pack_string(s));
        operands.extend_from_slice(after);
        self.inst(op, &operands);
    }

    pub fn words(&self) -> Vec<u32> {
        let mut words = vec![MAGIC, self.version, 0, self.next_id, 0];
        words.extend_from_slice(&self.body);
        words
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.words().iter().flat_map(|w| w.to_le_bytes().to_vec()).collect()
    }

    pub fn shader_preamble(&mut self) {
        self.inst(spv::Op::Capability, &[spv::Capability::Shader as u32]);
        self.inst(spv::Op::MemoryModel, &[
            spv::AddressingModel::Logical as u32,
            spv::MemoryModel::GLSL450 as u32,
        ]);
    }

    pub fn capability(&mut self, cap: spv::Capability) {
        self.inst(spv::Op::Capability, &[cap as u32]);
    }

    pub fn extension(&mut self, name: &str) {
        self.inst_str(spv::Op::Extension, &[], name, &[]);
    }

    pub fn ext_inst_import(&mut self, name: &str) -> u32 {
        let id = self.id();
        self.inst_str(spv::Op::ExtInstImport, &[id], name, &[]);
        id
    }

    pub fn string(&mut self, s: &str) -> u32 {
        let id = self.id();
        self.inst_str(spv::Op::String, &[id], s, &[]);
        id
    }

    pub fn source(&mut self, lang: spv::SourceLanguage, version: u32, file: Option<u32>) {
        let mut operands = vec![lang as u32, version];
        operands.extend(file);
        self.inst(spv::Op::Source, &operands);
    }

    pub fn name(&mut self, target: u32, name: &str) {
        self.inst_str(spv::Op::Name, &[target], name, &[]);
    }

    pub fn member_name(&mut self, ty: u32, member: u32, name: &str) {
        self.inst_str(spv::Op::MemberName, &[ty, member], name, &[]);
    }

    pub fn decorate(&mut self, target: u32, deco: spv::Decoration, operands: &[u32]) {
        let mut ops = vec![target, deco as u32];
        ops.extend_from_slice(operands);
        self.inst(spv::Op::Decorate, &ops);
    }

    pub fn member_decorate(
        &mut self,
        ty: u32,
        member: u32,
        deco: spv::Decoration,
        operands: &[u32],
    ) {
        let mut ops = vec![ty, member, deco as u32];
        ops.extend_from_slice(operands);
        self.inst(spv::Op::MemberDecorate, &ops);
    }

    /// Decorates a resource variable with its set and binding.
    pub fn bind(&mut self, var: u32, set: u32, binding: u32) {
        self.decorate(var, spv::Decoration::DescriptorSet, &[set]);
        self.decorate(var, spv::Decoration::Binding, &[binding]);
    }

    pub fn type_void(&mut self) -> u32 {
        if let Some(id) = self.void {
            return id;
        }
        let id = self.id();
        self.inst(spv::Op::TypeVoid, &[id]);
        self.void = Some(id);
        id
    }

    fn scalar(&mut self, op: spv::Op, operands: &[u32]) -> u32 {
        let key = (op as u32, operands[0], operands.get(1).copied().unwrap_or(0));
        if let Some(&id) = self.scalars.get(&key) {
            return id;
        }
        let id = self.id();
        let mut ops = vec![id];
        ops.extend_from_slice(operands);
        self.inst(op, &ops);
        self.scalars.insert(key, id);
        id
    }

    pub fn type_int(&mut self, width: u32, signed: bool) -> u32 {
        self.scalar(spv::Op::TypeInt, &[width, signed as u32])
    }

    pub fn type_float(&mut self, width: u32) -> u32 {
        self.scalar(spv::Op::TypeFloat, &[width])
    }

    pub fn type_vector(&mut self, component: u32, count: u32) -> u32 {
        let id = self.id();
        self.inst(spv::Op::TypeVector, &[id, component, count]);
        id
    }

    pub fn type_matrix(&mut self, column: u32, count: u32) -> u32 {
        let id = self.id();
        self.inst(spv::Op::TypeMatrix, &[id, column, count]);
        id
    }

    pub fn constant_u32(&mut self, value: u32) -> u32 {
        let uint = self.type_int(32, false);
        let id = self.id();
        self.inst(spv::Op::Constant, &[uint, id, value]);
        id
    }

    pub fn type_array(&mut self, elem: u32, length: u32) -> u32 {
        let length = self.constant_u32(length);
        let id = self.id();
        self.inst(spv::Op::TypeArray, &[id, elem, length]);
        id
    }

    pub fn type_runtime_array(&mut self, elem: u32) -> u32 {
        let id = self.id();
        self.inst(spv::Op::TypeRuntimeArray, &[id, elem]);
        id
    }

    pub fn type_struct(&mut self, members: &[u32]) -> u32 {
        let id = self.id();
        let mut ops = vec![id];
        ops.extend_from_slice(members);
        self.inst(spv::Op::TypeStruct, &ops);
        id
    }

    /// A struct with consecutive explicit offsets.
    pub fn type_block(&mut self, members: &[(u32, u32)]) -> u32 {
        let types: Vec<u32> = members.iter().map(|&(ty, _)| ty).collect();
        let id = self.type_struct(&types);
        for (i, &(_, offset)) in members.iter().enumerate() {
            self.member_decorate(id, i as u32, spv::Decoration::Offset, &[offset]);
        }
        id
    }

    pub fn type_pointer(&mut self, storage: spv::StorageClass, pointee: u32) -> u32 {
        let id = self.id();
        self.inst(spv::Op::TypePointer, &[id, storage as u32, pointee]);
        id
    }

    pub fn type_function(&mut self, ret: u32, params: &[u32]) -> u32 {
        let id = self.id();
        let mut ops = vec![id, ret];
        ops.extend_from_slice(params);
        self.inst(spv::Op::TypeFunction, &ops);
        id
    }

    pub fn type_sampler(&mut self) -> u32 {
        let id = self.id();
        self.inst(spv::Op::TypeSampler, &[id]);
        id
    }

    /// A float image with unknown format.
    pub fn type_image(&mut self, dim: spv::Dim, arrayed: bool, sampled: u32) -> u32 {
        let float = self.type_float(32);
        let id = self.id();
        self.inst(spv::Op::TypeImage, &[
            id, float, dim as u32, 0, arrayed as u32, 0, sampled,
            spv::ImageFormat::Unknown as u32,
        ]);
        id
    }

    pub fn type_sampled_image(&mut self, image: u32) -> u32 {
        let id = self.id();
        self.inst(spv::Op::TypeSampledImage, &[id, image]);
        id
    }

    pub fn variable(&mut self, ptr: u32, storage: spv::StorageClass) -> u32 {
        let id = self.id();
        self.variable_with_id(id, ptr, storage);
        id
    }

    pub fn variable_with_id(&mut self, id: u32, ptr: u32, storage: spv::StorageClass) {
        self.inst(spv::Op::Variable, &[ptr, id, storage as u32]);
    }

    /// Declares the pointer type and the variable in one go.
    pub fn global(&mut self, storage: spv::StorageClass, ty: u32) -> u32 {
        let ptr = self.type_pointer(storage, ty);
        self.variable(ptr, storage)
    }

    /// Emits `void f()` with the instructions written by `body`, which
    /// also receives the void type id.
    pub fn void_function(&mut self, body: impl FnOnce(&mut Self, u32)) -> u32 {
        let void = self.type_void();
        let fn_ty = match self.void_fn {
            Some(id) => id,
            None => {
                let id = self.type_function(void, &[]);
                self.void_fn = Some(id);
                id
            },
        };
        let id = self.id();
        let label = self.id();
        self.inst(spv::Op::Function, &[void, id, 0, fn_ty]);
        self.inst(spv::Op::Label, &[label]);
        body(self, void);
        self.inst(spv::Op::Return, &[]);
        self.inst(spv::Op::FunctionEnd, &[]);
        id
    }

    /// A function body that loads from each of `vars`.
    pub fn loading_function(&mut self, vars: &[(u32, u32)]) -> u32 {
        self.void_function(|asm, _| {
            for &(ty, var) in vars.iter() {
                let value = asm.id();
                asm.inst(spv::Op::Load, &[ty, value, var]);
            }
        })
    }

    pub fn entry_point(
        &mut self,
        model: spv::ExecutionModel,
        function: u32,
        name: &str,
        interface: &[u32],
    ) {
        self.inst_str(spv::Op::EntryPoint, &[model as u32, function], name, interface);
    }

    pub fn execution_mode(&mut self, function: u32, mode: spv::ExecutionMode, operands: &[u32]) {
        let mut ops = vec![function, mode as u32];
        ops.extend_from_slice(operands);
        self.inst(spv::Op::ExecutionMode, &ops);
    }
}

/// A fragment shader with an empty `main`.
pub fn minimal_module() -> Vec<u8> {
    let mut asm = Assembler::new();
    asm.shader_preamble();
    let main = asm.void_function(|_, _| {});
    asm.entry_point(spv::ExecutionModel::Fragment, main, "main", &[]);
    asm.execution_mode(main, spv::ExecutionMode::OriginUpperLeft, &[]);
    asm.bytes()
}

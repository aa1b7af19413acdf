//! Derives descriptor bindings, push constants and entry points from the
//! module graph.
use fnv::FnvHashSet as HashSet;
use log::trace;
use num_traits::FromPrimitive;
use spirv_headers as spv;

use crate::*;
use crate::classify::{classify, is_descriptor_storage, shape_of, Shape};
use crate::diag::report;
use crate::layout::{block_members, block_variable, numeric_traits, peel_arrays, type_size};

#[derive(Debug, Default)]
pub(crate) struct Reflection {
    pub(crate) descriptor_bindings: Vec<DescriptorBinding>,
    pub(crate) push_constants: Vec<PushConstantBlock>,
    pub(crate) entry_points: Vec<EntryPoint>,
}

pub(crate) fn resolve(graph: &Graph, diagnostics: &mut Vec<Diagnostic>) -> Result<Reflection> {
    let entry_points = graph.entry_points().iter()
        .map(|entry| resolve_entry_point(graph, entry))
        .collect::<Result<Vec<_>>>()?;
    let accessed: HashSet<Id> = entry_points.iter()
        .flat_map(|entry| entry.used_variables.iter().copied())
        .collect();

    let mut reflection = Reflection { entry_points, ..Default::default() };
    for (id, var) in graph.variables() {
        let storage = try_opt!(var.storage_class(), continue);
        if is_descriptor_storage(storage) {
            let binding = resolve_binding(graph, id, storage, diagnostics)?;
            if let Some(mut binding) = binding {
                binding.accessed = accessed.contains(&id);
                reflection.descriptor_bindings.push(binding);
            }
        } else if storage == spv::StorageClass::PushConstant {
            let block = resolve_push_constant(graph, id, diagnostics)?;
            if let Some(mut block) = block {
                block.accessed = accessed.contains(&id);
                reflection.push_constants.push(block);
            }
        }
    }
    reflection.descriptor_bindings
        .sort_by_key(|binding| (binding.set, binding.binding, binding.variable));

    Ok(reflection)
}

fn owned_name(name: Option<&str>) -> Option<String> {
    name.map(ToOwned::to_owned)
}

fn resolve_binding(
    graph: &Graph,
    id: Id,
    storage: spv::StorageClass,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<DescriptorBinding>> {
    let name = owned_name(graph.name(id));
    let decos = graph.decorations(id);
    let (elem, array) = peel_arrays(graph, graph.variable_pointee(id)?)?;
    let set = decos.value(spv::Decoration::DescriptorSet);
    let binding = decos.value(spv::Decoration::Binding);
    let (set, binding) = match (set, binding) {
        (Some(set), Some(binding)) => (set, binding),
        (set, binding) => {
            let missing = match (set, binding) {
                (None, None) => MissingDecoration::Both,
                (None, _) => MissingDecoration::DescriptorSet,
                _ => MissingDecoration::Binding,
            };
            report(diagnostics, Diagnostic::UnboundDescriptorVariable {
                variable: id,
                name,
                missing,
            });
            return Ok(None);
        },
    };

    let (shape, qualifier) = shape_of(graph, elem)?;
    let descriptor_type = match classify(shape, storage, qualifier) {
        Some(ty) => ty,
        None => {
            report(diagnostics, Diagnostic::UnclassifiedResource { variable: id, name });
            return Ok(None);
        },
    };
    trace!("resolve_binding: %{} ({}, {}) -> {}", id, set, binding, descriptor_type);

    let image = match *graph.resolve_type(elem)? {
        TypeNode::Image(ref image) => Some((**image).clone()),
        TypeNode::SampledImage { image } => match graph.resolve_type(image)? {
            TypeNode::Image(image) => Some((**image).clone()),
            _ => None,
        },
        _ => None,
    };
    let block = if shape == Shape::Struct {
        Some(block_variable(graph, elem, name.clone())?)
    } else { None };
    let count = array.element_count()
        .ok_or_else(|| Error::for_id(ErrorKind::LimitExceeded, id))?;

    Ok(Some(DescriptorBinding {
        set,
        binding,
        descriptor_type,
        count,
        type_name: owned_name(graph.name(elem)),
        name,
        variable: id,
        storage_class: storage as u32,
        array,
        block,
        image,
        input_attachment_index: decos.value(spv::Decoration::InputAttachmentIndex),
        accessed: false,
    }))
}

fn resolve_push_constant(graph: &Graph, id: Id, diagnostics: &mut Vec<Diagnostic>)
    -> Result<Option<PushConstantBlock>>
{
    let ty = graph.variable_pointee(id)?;
    if !graph.resolve_type(ty)?.is_struct() {
        report(diagnostics, Diagnostic::NonStructPushConstant { variable: id });
        return Ok(None);
    }

    let members: Vec<_> = block_members(graph, ty, 0)?.into_iter()
        .map(|member| PushConstantMember {
            name: member.name,
            offset: member.offset,
            size: member.size,
        })
        .collect();
    let offset = members.iter().map(|member| member.offset).min().unwrap_or(0);
    let end = type_size(graph, ty, &Decorations::default())?;

    Ok(Some(PushConstantBlock {
        name: owned_name(graph.name(id)),
        type_name: owned_name(graph.name(ty)),
        variable: id,
        offset,
        size: end.saturating_sub(offset),
        members,
        accessed: false,
    }))
}

fn resolve_interface_variable(graph: &Graph, id: Id, storage: spv::StorageClass)
    -> Result<InterfaceVariable>
{
    let ty = graph.variable_pointee(id)?;
    let (elem, array) = peel_arrays(graph, ty)?;
    let decos = graph.decorations(id);
    Ok(InterfaceVariable {
        variable: id,
        name: owned_name(graph.name(id)),
        ty,
        storage_class: storage,
        location: decos.value(spv::Decoration::Location),
        component: decos.value(spv::Decoration::Component),
        built_in: decos.value(spv::Decoration::BuiltIn),
        numeric: numeric_traits(graph, elem, decos)?,
        array,
    })
}

fn constant_u32(graph: &Graph, id: Id) -> Result<u32> {
    graph.constant(id)
        .and_then(|c| c.as_u32())
        .ok_or_else(|| Error::for_id(ErrorKind::UnresolvedId, id))
}

fn local_size(graph: &Graph, modes: &[ExecutionModeDecl]) -> Result<Option<[u32; 3]>> {
    for mode in modes.iter() {
        let ops = &mode.operands;
        if ops.len() < 3 { continue; }
        match spv::ExecutionMode::from_u32(mode.mode) {
            Some(spv::ExecutionMode::LocalSize) => return Ok(Some([ops[0], ops[1], ops[2]])),
            Some(spv::ExecutionMode::LocalSizeId) => return Ok(Some([
                constant_u32(graph, ops[0])?,
                constant_u32(graph, ops[1])?,
                constant_u32(graph, ops[2])?,
            ])),
            _ => {},
        }
    }
    Ok(None)
}

fn resolve_entry_point(graph: &Graph, entry: &EntryPointDecl) -> Result<EntryPoint> {
    let mut inputs = Vec::new();
    let mut outputs = Vec::new();
    for &id in entry.interface.iter() {
        let var = graph.variable(id)
            .ok_or_else(|| Error::for_id(ErrorKind::UnresolvedId, id))?;
        let storage = try_opt!(var.storage_class(), continue);
        if !is_interface_storage(storage) { continue; }
        let var = resolve_interface_variable(graph, id, storage)?;
        if storage == spv::StorageClass::Input {
            inputs.push(var);
        } else {
            outputs.push(var);
        }
    }

    Ok(EntryPoint {
        name: entry.name.clone(),
        execution_model: entry.execution_model,
        stage: ShaderStage::from_execution_model(entry.execution_model),
        function: entry.function,
        interface: entry.interface.clone(),
        inputs,
        outputs,
        local_size: local_size(graph, &entry.modes)?,
        execution_modes: entry.modes.iter()
            .map(|mode| (mode.mode, mode.operands.clone()))
            .collect(),
        used_variables: graph.reachable_variables(entry.function),
    })
}

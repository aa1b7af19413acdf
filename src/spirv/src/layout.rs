//! Numeric traits, array dimensions and explicit buffer layout.
use spirv_headers as spv;

use crate::*;

/// Strips array types off `ty`, outermost first, returning the element
/// type and the collected dimensions.
pub(crate) fn peel_arrays(graph: &Graph, mut ty: Id) -> Result<(Id, ArrayTraits)> {
    let mut array = ArrayTraits::default();
    loop {
        let dim = match *graph.resolve_type(ty)? {
            TypeNode::Array { elem, length, .. } => (elem, length.unwrap_or(1)),
            TypeNode::RuntimeArray { elem } => (elem, UNBOUNDED_COUNT),
            _ => return Ok((ty, array)),
        };
        if array.stride.is_none() {
            array.stride = graph.decorations(ty).value(spv::Decoration::ArrayStride);
        }
        array.dims.push(dim.1);
        ty = dim.0;
    }
}

/// Numeric description of a scalar, vector or matrix type. `decos` are
/// the decorations of the member holding the value, if any.
pub(crate) fn numeric_traits(graph: &Graph, ty: Id, decos: &Decorations) -> Result<NumericTraits>
{
    let mut traits = NumericTraits::default();
    match *graph.resolve_type(ty)? {
        TypeNode::Matrix { column, count } => {
            traits = numeric_traits(graph, column, decos)?;
            traits.row_count = traits.component_count;
            traits.column_count = count;
            traits.matrix_stride = decos.value(spv::Decoration::MatrixStride);
        },
        TypeNode::Vector { component, count } => {
            traits.scalar = scalar_traits(graph.resolve_type(component)?);
            traits.component_count = count;
        },
        ref other => traits.scalar = scalar_traits(other),
    }
    Ok(traits)
}

fn scalar_traits(ty: &TypeNode) -> ScalarTraits {
    match *ty {
        TypeNode::Int { width, signed } => ScalarTraits { width, signed, float: false },
        TypeNode::Float { width } => ScalarTraits { width, signed: true, float: true },
        TypeNode::Bool => ScalarTraits { width: 32, ..Default::default() },
        _ => Default::default(),
    }
}

/// Layout sizes and offsets are 32-bit; any arithmetic that would wrap
/// fails with `LimitExceeded` against the type being measured.
fn limit(ty: Id) -> Error {
    Error::for_id(ErrorKind::LimitExceeded, ty)
}

fn checked_mul(a: u32, b: u32, ty: Id) -> Result<u32> {
    a.checked_mul(b).ok_or_else(|| limit(ty))
}

fn checked_add(a: u32, b: u32, ty: Id) -> Result<u32> {
    a.checked_add(b).ok_or_else(|| limit(ty))
}

/// Byte size of `ty` under the explicit layout decorations. Runtime
/// arrays occupy no space.
pub(crate) fn type_size(graph: &Graph, ty: Id, decos: &Decorations) -> Result<u32> {
    Ok(match *graph.resolve_type(ty)? {
        TypeNode::Bool => 4,
        TypeNode::Int { width, .. } | TypeNode::Float { width } => width / 8,
        TypeNode::Vector { component, count } =>
            checked_mul(count, type_size(graph, component, decos)?, ty)?,
        TypeNode::Matrix { column, count } => {
            let rows = match *graph.resolve_type(column)? {
                TypeNode::Vector { count, .. } => count,
                _ => 1,
            };
            match decos.value(spv::Decoration::MatrixStride) {
                Some(stride) if decos.has(spv::Decoration::RowMajor) =>
                    checked_mul(rows, stride, ty)?,
                Some(stride) => checked_mul(count, stride, ty)?,
                None => checked_mul(count, type_size(graph, column, decos)?, ty)?,
            }
        },
        TypeNode::Array { elem, length, .. } => {
            let length = length.unwrap_or(1);
            let stride = match graph.decorations(ty).value(spv::Decoration::ArrayStride) {
                Some(stride) => stride,
                None => type_size(graph, elem, decos)?,
            };
            checked_mul(length, stride, ty)?
        },
        TypeNode::RuntimeArray { .. } => 0,
        TypeNode::Struct { ref members } => {
            let mut end = 0;
            for member in members.iter() {
                let offset = member.offset.unwrap_or(end);
                let size = type_size(graph, member.ty, &member.decorations)?;
                end = end.max(checked_add(offset, size, ty)?);
            }
            end
        },
        // Physical storage buffer addresses
        TypeNode::Pointer { .. } => 8,
        _ => 0,
    })
}

/// Lays out the members of a block rooted at `struct_id`.
/// `base` is the absolute offset of the struct itself.
pub(crate) fn block_members(graph: &Graph, struct_id: Id, base: u32)
    -> Result<Vec<BlockVariable>>
{
    let members = match graph.resolve_type(struct_id)? {
        TypeNode::Struct { members } => members,
        _ => return Ok(Vec::new()),
    };
    let struct_size = type_size(graph, struct_id, &Decorations::default())?;

    let mut vars = Vec::with_capacity(members.len());
    let mut end = 0;
    for member in members.iter() {
        let offset = member.offset.unwrap_or(end);
        let size = type_size(graph, member.ty, &member.decorations)?;
        end = end.max(checked_add(offset, size, struct_id)?);
        let absolute_offset = checked_add(base, offset, struct_id)?;

        let (elem, array) = peel_arrays(graph, member.ty)?;
        let nested = if graph.resolve_type(elem)?.is_struct() {
            block_members(graph, elem, absolute_offset)?
        } else { Vec::new() };
        vars.push(BlockVariable {
            name: member.name.clone(),
            ty: member.ty,
            offset,
            absolute_offset,
            size,
            padded_size: size,
            numeric: numeric_traits(graph, elem, &member.decorations)?,
            array,
            row_major: member.decorations.has(spv::Decoration::RowMajor),
            members: nested,
        });
    }

    // Each member pads out to the next member by offset, or to the end
    // of the struct.
    for i in 0..vars.len() {
        let offset = vars[i].offset;
        let next = vars.iter()
            .map(|var| var.offset)
            .filter(|&other| other > offset)
            .min()
            .unwrap_or(struct_size);
        vars[i].padded_size = next.saturating_sub(offset).max(vars[i].size);
    }

    Ok(vars)
}

/// The whole block variable for a buffer whose element type is
/// `struct_id`.
pub(crate) fn block_variable(graph: &Graph, struct_id: Id, name: Option<String>)
    -> Result<BlockVariable>
{
    let size = type_size(graph, struct_id, &Decorations::default())?;
    Ok(BlockVariable {
        name,
        ty: struct_id,
        offset: 0,
        absolute_offset: 0,
        size,
        padded_size: size,
        numeric: Default::default(),
        array: Default::default(),
        row_major: false,
        members: block_members(graph, struct_id, 0)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::Decoder;
    use crate::testing::*;

    fn build_graph(asm: &Assembler) -> Graph {
        let words = asm.words();
        let decoder = Decoder::new(&words).unwrap();
        crate::graph::build(&decoder, &mut Vec::new()).unwrap()
    }

    #[test]
    fn std140_block() {
        // struct { vec4 color; mat4 xform; float weights[4]; }
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let vec4 = asm.type_vector(float, 4);
        let mat4 = asm.type_matrix(vec4, 4);
        let weights = asm.type_array(float, 4);
        asm.decorate(weights, spv::Decoration::ArrayStride, &[16]);
        let block = asm.type_struct(&[vec4, mat4, weights]);
        asm.member_decorate(block, 0, spv::Decoration::Offset, &[0]);
        asm.member_decorate(block, 1, spv::Decoration::Offset, &[16]);
        asm.member_decorate(block, 1, spv::Decoration::ColMajor, &[]);
        asm.member_decorate(block, 1, spv::Decoration::MatrixStride, &[16]);
        asm.member_decorate(block, 2, spv::Decoration::Offset, &[80]);
        let graph = build_graph(&asm);

        let empty = Decorations::default();
        assert_eq!(type_size(&graph, vec4, &empty).unwrap(), 16);
        assert_eq!(type_size(&graph, weights, &empty).unwrap(), 64);
        assert_eq!(type_size(&graph, block, &empty).unwrap(), 144);

        let var = block_variable(&graph, block, None).unwrap();
        assert_eq!(var.size, 144);
        let members = &var.members;
        assert_eq!(members.len(), 3);
        assert_eq!((members[1].offset, members[1].size), (16, 64));
        assert_eq!(members[1].numeric.column_count, 4);
        assert_eq!(members[1].numeric.row_count, 4);
        assert_eq!(members[1].numeric.matrix_stride, Some(16));
        assert_eq!(members[2].array.dims, vec![4]);
        assert_eq!(members[2].array.stride, Some(16));
        assert!(members[2].numeric.scalar.float);
        assert_eq!(members[0].padded_size, 16);
    }

    #[test]
    fn nested_offsets_and_padding() {
        // struct Inner { float a; } ; struct { float x; Inner inner; }
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let inner = asm.type_struct(&[float]);
        asm.member_decorate(inner, 0, spv::Decoration::Offset, &[0]);
        let outer = asm.type_struct(&[float, inner]);
        asm.member_decorate(outer, 0, spv::Decoration::Offset, &[0]);
        asm.member_decorate(outer, 1, spv::Decoration::Offset, &[16]);
        let graph = build_graph(&asm);

        let members = block_members(&graph, outer, 0).unwrap();
        assert_eq!(members[0].padded_size, 16);
        assert_eq!(members[1].members[0].absolute_offset, 16);
        assert_eq!(members[1].members[0].offset, 0);
    }

    #[test]
    fn runtime_arrays() {
        let mut asm = Assembler::new();
        let uint = asm.type_int(32, false);
        let runtime = asm.type_runtime_array(uint);
        asm.decorate(runtime, spv::Decoration::ArrayStride, &[4]);
        let outer = asm.type_array(runtime, 3);
        let graph = build_graph(&asm);

        let (elem, array) = peel_arrays(&graph, outer).unwrap();
        assert_eq!(elem, uint);
        assert_eq!(array.dims, vec![3, UNBOUNDED_COUNT]);
        assert_eq!(array.stride, Some(4));
        assert!(array.is_unbounded());
        assert_eq!(type_size(&graph, runtime, &Decorations::default()).unwrap(), 0);
    }

    #[test]
    fn oversized_array() {
        // float a[0x40000000] with a 16-byte stride spans 16 GiB.
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let huge = asm.type_array(float, 0x4000_0000);
        asm.decorate(huge, spv::Decoration::ArrayStride, &[16]);
        let block = asm.type_struct(&[huge]);
        asm.member_decorate(block, 0, spv::Decoration::Offset, &[0]);
        let graph = build_graph(&asm);

        let err = type_size(&graph, huge, &Decorations::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
        assert_eq!(err.context(), Some(Context::Id(huge)));
        let err = block_variable(&graph, block, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
    }

    #[test]
    fn member_end_past_u32() {
        // The member fits, but its offset pushes the end of the struct
        // past 4 GiB.
        let mut asm = Assembler::new();
        let float = asm.type_float(32);
        let vec4 = asm.type_vector(float, 4);
        let block = asm.type_struct(&[vec4]);
        asm.member_decorate(block, 0, spv::Decoration::Offset, &[u32::MAX - 8]);
        let graph = build_graph(&asm);

        let err = type_size(&graph, block, &Decorations::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::LimitExceeded);
        assert_eq!(err.context(), Some(Context::Id(block)));
    }
}

use std::collections::HashSet;
use std::io::{self, BufReader, BufWriter, Read, Write};

use crate::error::ModeError;
use crate::multimodal::{MultiModal, Node};
use crate::store::ModeStore;

const MAGIC: [u8; 4] = *b"MMOD";
const VERSION: u32 = 1;

/// magic + version + dim + max_nodes + next_id + node_count
const HEADER_LEN: u64 = 4 + 4 + 4 + 4 + 8 + 4;

/// Number of bytes [`save`] produces for `nodes` nodes of dimension `dim`.
pub(crate) fn encoded_len(dim: usize, nodes: usize) -> u64 {
    HEADER_LEN + nodes as u64 * (8 + 8 + 4 * dim as u64)
}

/// State read back from a stream, before links are rebuilt.
pub(crate) struct Decoded {
    pub(crate) dim: usize,
    pub(crate) max_nodes: usize,
    pub(crate) next_id: u64,
    pub(crate) nodes: Vec<Node>,
}

fn io_err(e: io::Error) -> ModeError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ModeError::InvalidFormat("unexpected end of stream".into())
    } else {
        ModeError::Io(e.to_string())
    }
}

pub(crate) fn save(mm: &MultiModal, w: &mut dyn Write) -> Result<u64, ModeError> {
    let mut bw = BufWriter::new(w);
    let nodes = mm.nodes();

    bw.write_all(&MAGIC).map_err(io_err)?;
    bw.write_all(&VERSION.to_le_bytes()).map_err(io_err)?;
    bw.write_all(&(mm.dim() as u32).to_le_bytes()).map_err(io_err)?;
    bw.write_all(&(mm.max_nodes() as u32).to_le_bytes()).map_err(io_err)?;
    bw.write_all(&mm.next_id().to_le_bytes()).map_err(io_err)?;
    bw.write_all(&(nodes.len() as u32).to_le_bytes()).map_err(io_err)?;

    for nd in nodes {
        bw.write_all(&nd.id.to_le_bytes()).map_err(io_err)?;
        bw.write_all(&nd.count.to_le_bytes()).map_err(io_err)?;
        for &v in &nd.mean {
            bw.write_all(&v.to_le_bytes()).map_err(io_err)?;
        }
    }

    bw.flush().map_err(io_err)?;
    Ok(encoded_len(mm.dim(), nodes.len()))
}

fn read_u32(r: &mut impl Read) -> Result<u32, ModeError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(r: &mut impl Read) -> Result<u64, ModeError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf).map_err(io_err)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads a stream produced by [`save`]. Structural problems are reported as
/// [`ModeError::InvalidFormat`].
pub(crate) fn load(r: &mut dyn Read) -> Result<Decoded, ModeError> {
    let mut br = BufReader::new(r);

    let mut magic = [0u8; 4];
    br.read_exact(&mut magic).map_err(io_err)?;
    if magic != MAGIC {
        return Err(ModeError::InvalidFormat(format!("invalid magic {magic:?}")));
    }

    let version = read_u32(&mut br)?;
    if version != VERSION {
        return Err(ModeError::InvalidFormat(format!(
            "unsupported version {version} (want {VERSION})"
        )));
    }

    let dim = read_u32(&mut br)? as usize;
    if dim == 0 {
        return Err(ModeError::InvalidFormat("invalid dimension 0".into()));
    }
    let max_nodes = read_u32(&mut br)? as usize;
    let next_id = read_u64(&mut br)?;
    let node_count = read_u32(&mut br)? as usize;

    let mut nodes = Vec::with_capacity(node_count.min(4096));
    let mut seen = HashSet::with_capacity(node_count.min(4096));
    for _ in 0..node_count {
        let id = read_u64(&mut br)?;
        if id >= next_id {
            return Err(ModeError::InvalidFormat(format!(
                "node id {id} not below next id {next_id}"
            )));
        }
        if !seen.insert(id) {
            return Err(ModeError::InvalidFormat(format!("duplicate node id {id}")));
        }

        let count = read_u64(&mut br)?;
        if count == 0 {
            return Err(ModeError::InvalidFormat(format!("node {id} has zero count")));
        }

        let mut mean = vec![0.0f32; dim];
        for v in &mut mean {
            let mut fb = [0u8; 4];
            br.read_exact(&mut fb).map_err(io_err)?;
            *v = f32::from_le_bytes(fb);
            if !v.is_finite() {
                return Err(ModeError::InvalidFormat(format!("node {id} has a non-finite mean")));
            }
        }

        nodes.push(Node::new(id, count, mean));
    }

    Ok(Decoded {
        dim,
        max_nodes,
        next_id,
        nodes,
    })
}

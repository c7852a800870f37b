//! Per-frame binary output and checkpoint reading.
//!
//! Every frame writes the raw contiguous bytes of each field to
//! `<modelname>.<field>.<frame:06>` plus one tab-separated row in
//! `<modelname>.info`. The same files serve as checkpoints: a restart
//! reads them back, together with a small `chkpt` header holding the step
//! counters, and resumes bit-identically. Output failures are logged and
//! never abort a running solve.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::time::Instant;

use crate::config::Param;
use crate::constants::{NDIMS, NODES_PER_ELEM, NODES_PER_FACET, NSTR};
use crate::simulation::Variables;

fn frame_filename(modelname: &str, field: &str, frame: u32) -> String {
    format!("{}.{}.{:06}", modelname, field, frame)
}

fn write_file(path: &str, bytes: &[u8]) -> std::io::Result<()> {
    let mut f = File::create(path)?;
    f.write_all(bytes)
}

fn write_or_warn(path: &str, bytes: &[u8]) {
    if let Err(e) = write_file(path, bytes) {
        eprintln!("Warning: cannot write '{}': {}", path, e);
    }
}

fn flatten_i32<const W: usize>(rows: &[[usize; W]]) -> Vec<i32> {
    let mut out = Vec::with_capacity(rows.len() * W);
    for row in rows {
        for &v in row.iter() {
            out.push(v as i32);
        }
    }
    out
}

/// Write one output frame (fields, checkpoint header and info row).
pub fn output(param: &Param, var: &Variables, start: &Instant) {
    let name = &param.sim.modelname;
    let frame = var.frame;
    let run_time = start.elapsed().as_secs_f64();

    // Info row first; it indexes the frames.
    let info = format!(
        "{:6}\t{:10}\t{:12.6e}\t{:12.4e}\t{:12.6e}\t{:8}\t{:8}\t{:8}\n",
        frame, var.steps, var.time, var.dt, run_time, var.nnode, var.nelem, var.nseg
    );
    let info_path = format!("{}.info", name);
    let result = if frame == 0 {
        File::create(&info_path).and_then(|mut f| f.write_all(info.as_bytes()))
    } else {
        OpenOptions::new()
            .append(true)
            .open(&info_path)
            .and_then(|mut f| f.write_all(info.as_bytes()))
    };
    if let Err(e) = result {
        eprintln!("Warning: cannot write '{}': {}", info_path, e);
    }

    write_or_warn(
        &frame_filename(name, "coord", frame),
        bytemuck::cast_slice(var.coord.as_slice()),
    );
    write_or_warn(
        &frame_filename(name, "connectivity", frame),
        bytemuck::cast_slice(&flatten_i32(var.connectivity.as_slice())),
    );
    write_or_warn(
        &frame_filename(name, "temperature", frame),
        bytemuck::cast_slice(var.temperature.as_slice()),
    );
    write_or_warn(
        &frame_filename(name, "velocity", frame),
        bytemuck::cast_slice(var.vel.as_slice()),
    );
    write_or_warn(
        &frame_filename(name, "stress", frame),
        bytemuck::cast_slice(var.stress.as_slice()),
    );
    write_or_warn(
        &frame_filename(name, "strain", frame),
        bytemuck::cast_slice(var.strain.as_slice()),
    );
    write_or_warn(
        &frame_filename(name, "plstrain", frame),
        bytemuck::cast_slice(var.plstrain.as_slice()),
    );
    write_or_warn(
        &frame_filename(name, "segment", frame),
        bytemuck::cast_slice(&flatten_i32(var.segment.as_slice())),
    );
    let segflag_i32: Vec<i32> = var.segflag.iter().map(|&f| f as i32).collect();
    write_or_warn(
        &frame_filename(name, "segflag", frame),
        bytemuck::cast_slice(&segflag_i32),
    );

    // Checkpoint header: counters needed to resume exactly.
    let header = [
        var.time,
        var.dt,
        var.steps as f64,
        var.nnode as f64,
        var.nelem as f64,
        var.nseg as f64,
    ];
    let mut chkpt: Vec<u8> = bytemuck::cast_slice(&header).to_vec();
    let mattype_i32: Vec<i32> = var.mattype.iter().copied().collect();
    chkpt.extend_from_slice(bytemuck::cast_slice(&mattype_i32));
    write_or_warn(&frame_filename(name, "chkpt", frame), &chkpt);
}

/// Raw field arrays of one saved frame.
pub struct FrameData {
    pub time: f64,
    pub dt: f64,
    pub steps: u64,
    pub nnode: usize,
    pub nelem: usize,
    pub nseg: usize,
    pub coord: Vec<[f64; NDIMS]>,
    pub connectivity: Vec<[usize; NODES_PER_ELEM]>,
    pub segment: Vec<[usize; NODES_PER_FACET]>,
    pub segflag: Vec<u32>,
    pub temperature: Vec<f64>,
    pub vel: Vec<[f64; NDIMS]>,
    pub stress: Vec<[f64; NSTR]>,
    pub strain: Vec<[f64; NSTR]>,
    pub plstrain: Vec<f64>,
    pub mattype: Vec<i32>,
}

fn read_bytes(path: &str) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("cannot read '{}': {}", path, e))
}

fn bytes_to_f64(bytes: &[u8], path: &str) -> Result<Vec<f64>, String> {
    if bytes.len() % 8 != 0 {
        return Err(format!("'{}' is not a multiple of 8 bytes", path));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
        .collect())
}

fn bytes_to_i32(bytes: &[u8], path: &str) -> Result<Vec<i32>, String> {
    if bytes.len() % 4 != 0 {
        return Err(format!("'{}' is not a multiple of 4 bytes", path));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| i32::from_ne_bytes(c.try_into().unwrap()))
        .collect())
}

fn group_rows<T: Copy, const W: usize>(flat: &[T], path: &str) -> Result<Vec<[T; W]>, String> {
    if flat.len() % W != 0 {
        return Err(format!("'{}' is not a multiple of the row width {}", path, W));
    }
    Ok(flat
        .chunks_exact(W)
        .map(|c| {
            let mut row = [c[0]; W];
            row.copy_from_slice(c);
            row
        })
        .collect())
}

fn read_f64_rows<const W: usize>(
    name: &str,
    field: &str,
    frame: u32,
) -> Result<Vec<[f64; W]>, String> {
    let path = frame_filename(name, field, frame);
    let flat = bytes_to_f64(&read_bytes(&path)?, &path)?;
    group_rows(&flat, &path)
}

fn read_index_rows<const W: usize>(
    name: &str,
    field: &str,
    frame: u32,
) -> Result<Vec<[usize; W]>, String> {
    let path = frame_filename(name, field, frame);
    let flat = bytes_to_i32(&read_bytes(&path)?, &path)?;
    let flat: Vec<usize> = flat.into_iter().map(|v| v as usize).collect();
    group_rows(&flat, &path)
}

/// Read all arrays of one saved frame.
pub fn read_frame(param: &Param, frame: u32) -> Result<FrameData, String> {
    let name = &param.sim.modelname;

    let chkpt_path = frame_filename(name, "chkpt", frame);
    let chkpt = read_bytes(&chkpt_path)?;
    if chkpt.len() < 48 {
        return Err(format!("'{}' is truncated", chkpt_path));
    }
    let header = bytes_to_f64(&chkpt[..48], &chkpt_path)?;
    let (time, dt, steps) = (header[0], header[1], header[2] as u64);
    let (nnode, nelem, nseg) = (header[3] as usize, header[4] as usize, header[5] as usize);
    let mattype = bytes_to_i32(&chkpt[48..], &chkpt_path)?;

    let coord = read_f64_rows::<NDIMS>(name, "coord", frame)?;
    let connectivity = read_index_rows::<NODES_PER_ELEM>(name, "connectivity", frame)?;
    let segment = read_index_rows::<NODES_PER_FACET>(name, "segment", frame)?;
    let segflag_path = frame_filename(name, "segflag", frame);
    let segflag: Vec<u32> = bytes_to_i32(&read_bytes(&segflag_path)?, &segflag_path)?
        .into_iter()
        .map(|v| v as u32)
        .collect();

    let temp_path = frame_filename(name, "temperature", frame);
    let temperature = bytes_to_f64(&read_bytes(&temp_path)?, &temp_path)?;
    let vel = read_f64_rows::<NDIMS>(name, "velocity", frame)?;
    let stress = read_f64_rows::<NSTR>(name, "stress", frame)?;
    let strain = read_f64_rows::<NSTR>(name, "strain", frame)?;
    let pls_path = frame_filename(name, "plstrain", frame);
    let plstrain = bytes_to_f64(&read_bytes(&pls_path)?, &pls_path)?;

    if coord.len() != nnode
        || connectivity.len() != nelem
        || segment.len() != nseg
        || temperature.len() != nnode
        || mattype.len() != nelem
    {
        return Err(format!(
            "frame {} arrays do not match the checkpoint header",
            frame
        ));
    }

    Ok(FrameData {
        time,
        dt,
        steps,
        nnode,
        nelem,
        nseg,
        coord,
        connectivity,
        segment,
        segflag,
        temperature,
        vel,
        stress,
        strain,
        plstrain,
        mattype,
    })
}

/// Drop info rows newer than the restart frame so the resumed run appends
/// where the original left off.
pub fn truncate_info(param: &Param, frame: u32) -> Result<(), String> {
    let path = format!("{}.info", param.sim.modelname);
    let contents =
        std::fs::read_to_string(&path).map_err(|e| format!("cannot read '{}': {}", path, e))?;
    let kept: String = contents
        .lines()
        .filter(|line| {
            line.split_whitespace()
                .next()
                .and_then(|s| s.parse::<u32>().ok())
                .map(|f| f <= frame)
                .unwrap_or(false)
        })
        .map(|line| format!("{}\n", line))
        .collect();
    std::fs::write(&path, kept).map_err(|e| format!("cannot write '{}': {}", path, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_filename_padding() {
        assert_eq!(frame_filename("run", "coord", 7), "run.coord.000007");
        assert_eq!(frame_filename("run", "chkpt", 123456), "run.chkpt.123456");
    }

    #[test]
    fn test_flatten_i32() {
        let rows = [[1usize, 2], [3, 4]];
        assert_eq!(flatten_i32(&rows), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let values = [1.5f64, -2.25, 1e-9];
        let bytes: &[u8] = bytemuck::cast_slice(&values);
        let back = bytes_to_f64(bytes, "test").unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn test_group_rows() {
        let flat = [1.0, 2.0, 3.0, 4.0];
        let rows: Vec<[f64; 2]> = group_rows(&flat, "test").unwrap();
        assert_eq!(rows, vec![[1.0, 2.0], [3.0, 4.0]]);
        let bad: Result<Vec<[f64; 3]>, _> = group_rows(&flat, "test");
        assert!(bad.is_err());
    }
}

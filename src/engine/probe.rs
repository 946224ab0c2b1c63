// Probe store: the network of SH environment probes.
//
// Each probe is a position plus 9 packed coefficient groups:
//   xyz = indirect bounce (RGB), w = direct occlusion (monochrome).
// Probes are only ever appended; the whole store may be cleared.
//
// Probe file layout (little-endian, no padding):
//   i32 count
//   count × { f32 position[3], f32 sh[9][4] }   (39 floats per probe)

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use glam::{Vec2, Vec3, Vec4};
use log::info;

use super::error::{ProbeError, Result};
use super::sh::{self, ShCoefficients, ShColor9, ShScalar9, INV_F0, SH_COEFF_COUNT};

/// Floats per probe record in the probe file.
pub const FLOATS_PER_PROBE: usize = 3 + 4 * SH_COEFF_COUNT;

// ============================================================================
// PROBE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub position: Vec3,
    pub coefficients: ShCoefficients,
}

impl Probe {
    pub fn new(position: Vec3) -> Self {
        Self { position, coefficients: [Vec4::ZERO; SH_COEFF_COUNT] }
    }

    /// Ground-plane position used by the triangulation (X, Z).
    pub fn ground_position(&self) -> Vec2 {
        Vec2::new(self.position.x, self.position.z)
    }

    pub fn occlusion(&self) -> ShScalar9 {
        sh::occlusion_channel(&self.coefficients)
    }

    pub fn bounce(&self) -> ShColor9 {
        sh::bounce_channel(&self.coefficients)
    }

    fn write_occlusion(&mut self, direct: &ShScalar9) {
        for (c, d) in self.coefficients.iter_mut().zip(direct) {
            c.w = *d;
        }
    }

    fn write_bounce(&mut self, indirect: &ShColor9) {
        for (c, i) in self.coefficients.iter_mut().zip(indirect) {
            *c = i.extend(c.w);
        }
    }

    fn read_from(bytes: &[u8]) -> Self {
        let mut floats = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]));
        let mut next = || floats.next().unwrap_or(0.0);
        let position = Vec3::new(next(), next(), next());
        let coefficients = std::array::from_fn(|_| Vec4::new(next(), next(), next(), next()));
        Self { position, coefficients }
    }

    fn write_to(&self, out: &mut Vec<u8>) {
        for f in self.position.to_array() {
            out.extend_from_slice(&f.to_le_bytes());
        }
        for c in &self.coefficients {
            for f in c.to_array() {
                out.extend_from_slice(&f.to_le_bytes());
            }
        }
    }
}

// ============================================================================
// PROBE STORE
// ============================================================================

/// Growable probe list with revision counters.
///
/// `topology_revision` changes whenever the point set changes,
/// `coefficients_revision` whenever any coefficient is written.
/// Consumers compare revisions instead of sharing dirty flags.
#[derive(Debug, Default, Clone)]
pub struct ProbeStore {
    probes: Vec<Probe>,
    topology_revision: u64,
    coefficients_revision: u64,
}

impl ProbeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an un-baked probe (all coefficients zero). Returns its index.
    pub fn add_probe(&mut self, position: Vec3) -> usize {
        self.push(Probe::new(position))
    }

    /// Add a probe with precomputed coefficients. Returns its index.
    pub fn add_probe_with(&mut self, position: Vec3, coefficients: ShCoefficients) -> usize {
        self.push(Probe { position, coefficients })
    }

    fn push(&mut self, probe: Probe) -> usize {
        let idx = self.probes.len();
        self.probes.push(probe);
        self.topology_revision += 1;
        self.coefficients_revision += 1;
        idx
    }

    pub fn clear(&mut self) {
        self.probes.clear();
        self.topology_revision += 1;
        self.coefficients_revision += 1;
    }

    pub fn len(&self) -> usize { self.probes.len() }
    pub fn is_empty(&self) -> bool { self.probes.is_empty() }
    pub fn probes(&self) -> &[Probe] { &self.probes }
    pub fn topology_revision(&self) -> u64 { self.topology_revision }
    pub fn coefficients_revision(&self) -> u64 { self.coefficients_revision }

    pub fn get(&self, index: usize) -> Result<&Probe> {
        let count = self.probes.len();
        self.probes
            .get(index)
            .ok_or(ProbeError::ProbeIndexOutOfRange { index, count })
    }

    fn get_mut(&mut self, index: usize) -> Result<&mut Probe> {
        let count = self.probes.len();
        let probe = self
            .probes
            .get_mut(index)
            .ok_or(ProbeError::ProbeIndexOutOfRange { index, count })?;
        self.coefficients_revision += 1;
        Ok(probe)
    }

    /// Ground-plane positions of every probe, in index order.
    pub fn ground_positions(&self) -> Vec<Vec2> {
        self.probes.iter().map(Probe::ground_position).collect()
    }

    // ---- Coefficient updates -----------------------------------------------

    /// Merge a direct-occlusion vector into the w channel only.
    pub fn update_coefficients(&mut self, index: usize, direct: &ShScalar9) -> Result<()> {
        self.get_mut(index)?.write_occlusion(direct);
        Ok(())
    }

    /// Merge an indirect-bounce vector into the xyz channels, unmirrored.
    /// Used between bake bounces so the next bounce sees this one's light.
    pub fn update_bounce(&mut self, index: usize, indirect: &ShColor9) -> Result<()> {
        self.get_mut(index)?.write_bounce(indirect);
        Ok(())
    }

    /// Merge an indirect-bounce vector into the xyz channels with band 1
    /// negated: a surface consuming the field looks along the opposite
    /// direction from the one the probe captured.
    pub fn update_coefficients_reflected(&mut self, index: usize, indirect: &ShColor9) -> Result<()> {
        self.get_mut(index)?.write_bounce(&sh::reflect(indirect));
        Ok(())
    }

    /// Overwrite all 9×4 coefficients.
    pub fn set_coefficients(&mut self, index: usize, coefficients: ShCoefficients) -> Result<()> {
        self.get_mut(index)?.coefficients = coefficients;
        Ok(())
    }

    /// Occlusion channel becomes a clamped cosine lobe around `direction`.
    pub fn make_cosine_lobe(&mut self, index: usize, direction: Vec3) -> Result<()> {
        self.update_coefficients(index, &sh::cosine_lobe(direction))
    }

    /// Neutral probe: every channel evaluates to 1 in all directions.
    pub fn make_ambient(&mut self, index: usize) -> Result<()> {
        let mut coefficients = [Vec4::ZERO; SH_COEFF_COUNT];
        coefficients[0] = Vec4::splat(INV_F0);
        self.set_coefficients(index, coefficients)
    }

    // ---- Persistence -------------------------------------------------------

    /// Append the probes found in `reader` to the store.
    pub fn load_from<R: Read>(&mut self, mut reader: R) -> Result<usize> {
        let mut count_bytes = [0u8; 4];
        reader.read_exact(&mut count_bytes).map_err(|e| truncated(e, "probe count"))?;
        let count = i32::from_le_bytes(count_bytes);
        if count < 0 {
            return Err(ProbeError::InvalidProbeFile(format!("negative probe count {count}")));
        }

        let mut record = [0u8; FLOATS_PER_PROBE * 4];
        let mut loaded = Vec::with_capacity((count as usize).min(1 << 16));
        for i in 0..count {
            reader
                .read_exact(&mut record)
                .map_err(|e| truncated(e, &format!("probe record {i}")))?;
            loaded.push(Probe::read_from(&record));
        }

        if !loaded.is_empty() {
            self.probes.extend(loaded);
            self.topology_revision += 1;
            self.coefficients_revision += 1;
        }
        info!("Loaded {} probes ({} total)", count, self.probes.len());
        Ok(count as usize)
    }

    pub fn save_to<W: Write>(&self, mut writer: W) -> Result<()> {
        let count = i32::try_from(self.probes.len()).map_err(|_| {
            ProbeError::InvalidProbeFile(format!("{} probes exceed the i32 count field", self.probes.len()))
        })?;

        let mut bytes = Vec::with_capacity(4 + self.probes.len() * FLOATS_PER_PROBE * 4);
        bytes.extend_from_slice(&count.to_le_bytes());
        for probe in &self.probes {
            probe.write_to(&mut bytes);
        }
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let file = File::open(path.as_ref())?;
        self.load_from(BufReader::new(file))
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = File::create(path.as_ref())?;
        self.save_to(BufWriter::new(file))?;
        info!("Saved {} probes to {}", self.probes.len(), path.as_ref().display());
        Ok(())
    }
}

fn truncated(err: std::io::Error, what: &str) -> ProbeError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProbeError::InvalidProbeFile(format!("truncated file while reading {what}"))
    } else {
        ProbeError::Io(err)
    }
}

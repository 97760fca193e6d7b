//! Scripted collaborators for driver and orchestrator tests.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ndarray::Array2;

use specred_calib::{CalibrationBundle, CalibrationSteps, StepContext, StepError};
use specred_types::{
    ArcImage, BadPixelMask, BiasFrame, DetectorId, FlatField, Frame, FrameType, ProductKind,
    RowIndex, SlitTrace, SpecObj, TiltSolution, WaveSolution,
};

use crate::collab::{Extraction, FrameLoader, ScienceReducer};
use crate::driver::DetectorDriver;
use crate::error::{LoadError, OutputError};
use crate::exposure::ReducedImages;
use crate::flux::{SensFunc, SensFuncBuilder};
use crate::orchestrator::Collaborators;
use crate::output::{JsonSpectraWriter, Spec1dMeta, SpectraWriter};
use crate::table::{FrameRow, ObservationTable};

const SHAPE: (usize, usize) = (8, 6);
const NSLITS: usize = 2;

pub fn det(n: u8) -> DetectorId {
    DetectorId::new(n).unwrap()
}

pub fn row(filename: &str, types: &[FrameType], sci_id: u32, target: &str) -> FrameRow {
    FrameRow {
        filename: filename.into(),
        frame_types: types.to_vec(),
        sci_id,
        target: target.into(),
        setup: "A".into(),
        binning: "1,1".into(),
    }
}

/// Shared calibration frames (rows 0-2) and `n` science exposures `sci1`,
/// `sci2`, ... (rows 3.., bits 1, 2, 4, ...), all in setup `A`.
pub fn science_table(n: usize) -> ObservationTable {
    let all = (1u32 << n) - 1;
    let mut rows = vec![
        row("raw/b1.fits", &[FrameType::Bias], all, "bias"),
        row("raw/arc1.fits", &[FrameType::Arc], all, "arc"),
        row(
            "raw/flat1.fits",
            &[FrameType::Trace, FrameType::PixelFlat],
            all,
            "flat",
        ),
    ];
    for i in 0..n {
        rows.push(row(
            &format!("raw/sci{}.fits", i + 1),
            &[FrameType::Science],
            1 << i,
            &format!("field {}", i + 1),
        ));
    }
    ObservationTable::new(rows)
}

pub fn two_science_table() -> ObservationTable {
    science_table(2)
}

/// Append one standard per mask: `std1` (target `Feige 1`), `std2`, ...
pub fn with_standards(table: ObservationTable, masks: &[u32]) -> ObservationTable {
    let mut rows = table.rows().to_vec();
    for (i, mask) in masks.iter().enumerate() {
        rows.push(row(
            &format!("raw/std{}.fits", i + 1),
            &[FrameType::Standard],
            *mask,
            &format!("Feige {}", i + 1),
        ));
    }
    ObservationTable::new(rows)
}

/// Strip `frame_type` from every row, keeping row indices stable.
pub fn without(table: ObservationTable, frame_type: FrameType) -> ObservationTable {
    let rows = table
        .rows()
        .iter()
        .cloned()
        .map(|mut row| {
            row.frame_types.retain(|ft| *ft != frame_type);
            row
        })
        .collect();
    ObservationTable::new(rows)
}

// ---------------------------------------------------------------------------
// Frame loader
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedLoader {
    loads: RefCell<Vec<(FrameType, Vec<RowIndex>)>>,
    failing: RefCell<BTreeSet<String>>,
}

impl ScriptedLoader {
    /// Fail every load that includes a row whose filename ends in `filename`.
    pub fn fail_on(&self, filename: &str) {
        self.failing.borrow_mut().insert(filename.to_string());
    }

    pub fn loads(&self) -> Vec<(FrameType, Vec<RowIndex>)> {
        self.loads.borrow().clone()
    }
}

impl FrameLoader for ScriptedLoader {
    fn load_frames(
        &self,
        table: &ObservationTable,
        rows: &[RowIndex],
        _detector: DetectorId,
        frame_type: FrameType,
        _bias: Option<&BiasFrame>,
    ) -> Result<Frame, LoadError> {
        self.loads.borrow_mut().push((frame_type, rows.to_vec()));
        for index in rows {
            let filename = table
                .row(*index)
                .map(|r| r.filename.clone())
                .unwrap_or_default();
            if self.failing.borrow().iter().any(|f| filename.ends_with(f)) {
                return Err(LoadError {
                    filename,
                    reason: "scripted failure".into(),
                });
            }
        }
        Ok(Array2::from_elem(SHAPE, rows.len() as f32))
    }
}

// ---------------------------------------------------------------------------
// Calibration steps
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct CountingSteps {
    calls: RefCell<Vec<ProductKind>>,
    failing: RefCell<BTreeSet<ProductKind>>,
}

impl CountingSteps {
    pub fn fail_on(&self, kind: ProductKind) {
        self.failing.borrow_mut().insert(kind);
    }

    /// Every step invocation so far, in call order.
    pub fn calls(&self) -> Vec<ProductKind> {
        self.calls.borrow().clone()
    }

    fn enter(&self, kind: ProductKind) -> Result<(), StepError> {
        self.calls.borrow_mut().push(kind);
        if self.failing.borrow().contains(&kind) {
            return Err(StepError::Failed(format!("scripted {kind} failure")));
        }
        Ok(())
    }
}

impl CalibrationSteps for CountingSteps {
    fn bias(&self, _ctx: &StepContext<'_>, raw: Option<&Frame>) -> Result<BiasFrame, StepError> {
        self.enter(ProductKind::Bias)?;
        Ok(raw.map_or(BiasFrame::Overscan, |img| BiasFrame::Image(img.clone())))
    }

    fn arc(&self, _ctx: &StepContext<'_>, raw: &Frame) -> Result<ArcImage, StepError> {
        self.enter(ProductKind::Arc)?;
        Ok(ArcImage { image: raw.clone() })
    }

    fn bad_pixel_mask(
        &self,
        _ctx: &StepContext<'_>,
        _bias: &BiasFrame,
        arc: &ArcImage,
    ) -> Result<BadPixelMask, StepError> {
        self.enter(ProductKind::Bpm)?;
        Ok(BadPixelMask {
            mask: Array2::zeros(arc.shape()),
        })
    }

    fn trace(
        &self,
        _ctx: &StepContext<'_>,
        raw: &Frame,
        _bpm: &BadPixelMask,
    ) -> Result<SlitTrace, StepError> {
        self.enter(ProductKind::Trace)?;
        let nspec = raw.nrows();
        Ok(SlitTrace {
            lcen: Array2::from_elem((nspec, NSLITS), 1.0),
            rcen: Array2::from_elem((nspec, NSLITS), 4.0),
            pixcen: Array2::from_elem((nspec, NSLITS), 2),
            pixwid: vec![3; NSLITS],
            slitpix: Array2::zeros(raw.dim()),
        })
    }

    fn tilt(
        &self,
        _ctx: &StepContext<'_>,
        arc: &ArcImage,
        _trace: &SlitTrace,
    ) -> Result<TiltSolution, StepError> {
        self.enter(ProductKind::Tilt)?;
        Ok(TiltSolution {
            tilts: Array2::zeros(arc.shape()),
            satmask: Array2::zeros(arc.shape()),
        })
    }

    fn flat(
        &self,
        _ctx: &StepContext<'_>,
        _raw: Option<&Frame>,
        trace: &SlitTrace,
        _tilt: &TiltSolution,
    ) -> Result<FlatField, StepError> {
        self.enter(ProductKind::Flat)?;
        Ok(FlatField {
            pixelflat_norm: Array2::ones(trace.slitpix.dim()),
            slit_profiles: Array2::ones(trace.slitpix.dim()),
        })
    }

    fn wave(
        &self,
        _ctx: &StepContext<'_>,
        arc: &ArcImage,
        trace: &SlitTrace,
        _tilt: &TiltSolution,
    ) -> Result<WaveSolution, StepError> {
        self.enter(ProductKind::Wave)?;
        Ok(WaveSolution {
            coefficients: vec![vec![4000.0, 1.5]; trace.nslits()],
            rms: vec![0.05; trace.nslits()],
            wave_map: Array2::from_elem(arc.shape(), 4000.0),
        })
    }
}

// ---------------------------------------------------------------------------
// Science reduction
// ---------------------------------------------------------------------------

/// One call to [`ScienceReducer::reduce`].
#[derive(Clone, Debug)]
pub struct ScienceCall {
    pub exposure: String,
    pub detector: DetectorId,
    pub standard: bool,
    pub calib: CalibrationBundle,
}

#[derive(Default)]
pub struct ScriptedScience {
    calls: RefCell<Vec<ScienceCall>>,
}

impl ScriptedScience {
    pub fn calls(&self) -> Vec<ScienceCall> {
        self.calls.borrow().clone()
    }

    /// Number of reductions of the exposure named `basename`.
    pub fn reductions_of(&self, basename: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.exposure == basename)
            .count()
    }
}

impl ScienceReducer for ScriptedScience {
    fn reduce(
        &self,
        ctx: &StepContext<'_>,
        frame: &Frame,
        calib: &CalibrationBundle,
        standard: bool,
    ) -> Result<Extraction, StepError> {
        self.calls.borrow_mut().push(ScienceCall {
            exposure: ctx.exposure.to_string(),
            detector: ctx.detector,
            standard,
            calib: calib.clone(),
        });
        let specobj = SpecObj {
            name: format!("O0041-S0001-{}", ctx.detector.dnum().to_uppercase()),
            detector: ctx.detector,
            slit: 0,
            spat_pixpos: 41.0,
            wave: vec![4000.0, 4001.5, 4003.0],
            counts: vec![10.0, 20.0, 30.0],
            counts_ivar: vec![1.0, 1.0, 1.0],
            flux: None,
            flux_ivar: None,
        };
        Ok(Extraction {
            specobjs: vec![specobj],
            images: ReducedImages {
                sciimg: frame.clone(),
                skymodel: Array2::zeros(frame.dim()),
                ivar: Array2::ones(frame.dim()),
            },
        })
    }
}

// ---------------------------------------------------------------------------
// Sensitivity function
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct ScriptedSensFunc {
    built_from: RefCell<Vec<String>>,
}

impl ScriptedSensFunc {
    /// Standards a sensitivity function was built from.
    pub fn built_from(&self) -> Vec<String> {
        self.built_from.borrow().clone()
    }
}

impl SensFuncBuilder for ScriptedSensFunc {
    fn build(&self, std_name: &str, spectra: &[SpecObj]) -> Result<SensFunc, OutputError> {
        self.built_from.borrow_mut().push(std_name.to_string());
        let wave = spectra.first().map(|s| s.wave.clone()).unwrap_or_default();
        Ok(SensFunc {
            std_name: std_name.to_string(),
            response: vec![2.0; wave.len()],
            wave,
        })
    }

    fn apply(&self, sensfunc: &SensFunc, spectra: &mut [SpecObj]) -> Result<(), OutputError> {
        let scale = sensfunc.response.first().copied().unwrap_or(1.0);
        for obj in spectra {
            obj.flux = Some(obj.counts.iter().map(|c| c * scale).collect());
            obj.flux_ivar = Some(obj.counts_ivar.iter().map(|v| v / (scale * scale)).collect());
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

/// JSON writer that refuses to write chosen exposures.
pub struct FlakyWriter {
    inner: JsonSpectraWriter,
    failing: RefCell<BTreeSet<String>>,
}

impl FlakyWriter {
    pub fn new(inner: JsonSpectraWriter) -> Self {
        Self {
            inner,
            failing: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn fail_on(&self, basename: &str) {
        self.failing.borrow_mut().insert(basename.to_string());
    }
}

impl SpectraWriter for FlakyWriter {
    fn write_spectra(
        &self,
        basename: &str,
        spectra: &[SpecObj],
        meta: &Spec1dMeta,
    ) -> Result<PathBuf, OutputError> {
        if self.failing.borrow().contains(basename) {
            return Err(OutputError::Io(std::io::Error::other("disk full")));
        }
        self.inner.write_spectra(basename, spectra, meta)
    }

    fn read_spectra(&self, path: &Path) -> Result<(Vec<SpecObj>, Spec1dMeta), OutputError> {
        self.inner.read_spectra(path)
    }

    fn write_images(
        &self,
        basename: &str,
        images: &[(DetectorId, &ReducedImages)],
    ) -> Result<Option<PathBuf>, OutputError> {
        self.inner.write_images(basename, images)
    }
}

// ---------------------------------------------------------------------------
// Kit
// ---------------------------------------------------------------------------

/// A table plus one instance of every scripted collaborator.
pub struct Kit {
    pub table: ObservationTable,
    pub loader: ScriptedLoader,
    pub steps: CountingSteps,
    pub science: ScriptedScience,
    pub sensfunc: ScriptedSensFunc,
}

impl Kit {
    pub fn new(table: ObservationTable) -> Self {
        Self {
            table,
            loader: ScriptedLoader::default(),
            steps: CountingSteps::default(),
            science: ScriptedScience::default(),
            sensfunc: ScriptedSensFunc::default(),
        }
    }

    pub fn driver(&self) -> DetectorDriver<'_> {
        DetectorDriver::new(&self.table, &self.loader, &self.steps, &self.science)
    }

    pub fn collaborators<'a>(&'a self, writer: &'a dyn SpectraWriter) -> Collaborators<'a> {
        Collaborators {
            loader: &self.loader,
            steps: &self.steps,
            science: &self.science,
            writer,
            sensfunc: &self.sensfunc,
        }
    }
}

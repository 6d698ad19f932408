//! Force-map tables sampled on an irregular mesh and the interpolated
//! fields built from them.
//!
//! Tables arrive as delimited numeric text (one sample point per row) with
//! the layout auto-detected from the column count:
//!
//! - 4 columns: `x, y, Fx, Fy`
//! - 7 columns: `x, y, Fx, Fy, Fz, Fmag, Intensity`
//!
//! Queries go through a Delaunay triangulation of the sample points with
//! barycentric weighting inside the enclosing triangle. Anything outside the
//! convex hull interpolates to zero, so a simulated particle that escapes
//! the mapped region simply diffuses freely.

use std::fmt;
use std::io::Read;
use std::sync::Arc;

use log::debug;
use spade::{DelaunayTriangulation, FloatTriangulation, HasPosition, Point2, Triangulation};

use crate::error::TrapError;

/// One sample point of the table: position plus the channels attached to it.
struct FieldSample {
    position: Point2<f64>,
    force_x: f64,
    force_y: f64,
    intensity: f64,
}

impl HasPosition for FieldSample {
    type Scalar = f64;

    fn position(&self) -> Point2<f64> {
        self.position
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Schema {
    Compact,
    Extended,
}

impl Schema {
    fn from_columns(columns: usize) -> Option<Self> {
        match columns {
            4 => Some(Schema::Compact),
            7 => Some(Schema::Extended),
            _ => None,
        }
    }

    fn columns(self) -> usize {
        match self {
            Schema::Compact => 4,
            Schema::Extended => 7,
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Component {
    ForceX,
    ForceY,
    Intensity,
}

/// Read-only piecewise-linear map from a continuous 2-D position to one
/// channel of the table. Cheap to clone; safe to query from many threads.
#[derive(Clone)]
pub struct InterpolatedField {
    mesh: Arc<DelaunayTriangulation<FieldSample>>,
    component: Component,
}

impl InterpolatedField {
    /// Interpolated channel value at `(x, y)` in the table's native units.
    ///
    /// Outside the convex hull of the sample points (or for a non-finite
    /// query) this returns 0.0, never an error.
    pub fn value_at(&self, x: f64, y: f64) -> f64 {
        if !x.is_finite() || !y.is_finite() {
            return 0.0;
        }
        let component = self.component;
        self.mesh
            .barycentric()
            .interpolate(
                |vertex| {
                    let sample = vertex.data();
                    match component {
                        Component::ForceX => sample.force_x,
                        Component::ForceY => sample.force_y,
                        Component::Intensity => sample.intensity,
                    }
                },
                Point2::new(x, y),
            )
            .unwrap_or(0.0)
    }
}

impl fmt::Debug for InterpolatedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterpolatedField")
            .field("component", &self.component)
            .field("points", &self.mesh.num_vertices())
            .finish()
    }
}

/// A loaded force map: one shared triangulation, up to three channel views.
#[derive(Clone)]
pub struct ForceTable {
    mesh: Arc<DelaunayTriangulation<FieldSample>>,
    has_intensity: bool,
}

impl fmt::Debug for ForceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForceTable")
            .field("points", &self.mesh.num_vertices())
            .field("has_intensity", &self.has_intensity)
            .finish()
    }
}

impl ForceTable {
    /// Parse a table from delimited text. Lines starting with `#` and one
    /// leading non-numeric header row are skipped.
    pub fn from_reader(reader: impl Read) -> Result<Self, TrapError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut schema: Option<Schema> = None;
        let mut samples: Vec<FieldSample> = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            if record.is_empty() || (record.len() == 1 && record[0].is_empty()) {
                continue;
            }
            let schema = match schema {
                Some(schema) => schema,
                None => {
                    let detected = Schema::from_columns(record.len()).ok_or(
                        TrapError::UnrecognizedLayout {
                            columns: record.len(),
                        },
                    )?;
                    schema = Some(detected);
                    detected
                }
            };
            if record.len() != schema.columns() {
                return Err(TrapError::RaggedRow {
                    row: index + 1,
                    expected: schema.columns(),
                    got: record.len(),
                });
            }
            match parse_row(&record, index + 1) {
                Ok(fields) => samples.push(to_sample(&fields, schema)),
                // A single leading text row is the column header.
                Err(_) if samples.is_empty() && index == 0 => {
                    debug!("skipping header row: {record:?}");
                }
                Err(err) => return Err(err),
            }
        }

        let Some(schema) = schema else {
            return Err(TrapError::EmptyData);
        };
        if samples.is_empty() {
            return Err(TrapError::EmptyData);
        }
        if samples.len() < 3 {
            return Err(TrapError::NotEnoughPoints {
                needed: 3,
                got: samples.len(),
            });
        }

        let point_count = samples.len();
        let mesh = DelaunayTriangulation::bulk_load(samples)?;
        if mesh.num_inner_faces() == 0 {
            return Err(TrapError::DegenerateMesh);
        }
        debug!(
            "force table loaded: {point_count} points, {} triangles, schema {schema:?}",
            mesh.num_inner_faces()
        );
        Ok(Self {
            mesh: Arc::new(mesh),
            has_intensity: schema == Schema::Extended,
        })
    }

    /// Parse a table held in memory.
    pub fn from_text(text: &str) -> Result<Self, TrapError> {
        Self::from_reader(text.as_bytes())
    }

    /// Number of distinct sample points in the triangulation.
    pub fn num_points(&self) -> usize {
        self.mesh.num_vertices()
    }

    pub fn force_x(&self) -> InterpolatedField {
        self.field(Component::ForceX)
    }

    pub fn force_y(&self) -> InterpolatedField {
        self.field(Component::ForceY)
    }

    /// Intensity channel; present only for the extended layout.
    pub fn intensity(&self) -> Option<InterpolatedField> {
        self.has_intensity.then(|| self.field(Component::Intensity))
    }

    fn field(&self, component: Component) -> InterpolatedField {
        InterpolatedField {
            mesh: Arc::clone(&self.mesh),
            component,
        }
    }
}

/// Convenience wrapper returning the per-channel fields directly.
pub fn load_force_table(
    reader: impl Read,
) -> Result<(InterpolatedField, InterpolatedField, Option<InterpolatedField>), TrapError> {
    let table = ForceTable::from_reader(reader)?;
    Ok((table.force_x(), table.force_y(), table.intensity()))
}

fn parse_row(record: &csv::StringRecord, row: usize) -> Result<Vec<f64>, TrapError> {
    record
        .iter()
        .enumerate()
        .map(|(column, raw)| {
            let value: f64 = raw
                .parse()
                .map_err(|_| TrapError::MalformedField { row, column })?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(TrapError::MalformedField { row, column })
            }
        })
        .collect()
}

fn to_sample(fields: &[f64], schema: Schema) -> FieldSample {
    FieldSample {
        position: Point2::new(fields[0], fields[1]),
        force_x: fields[2],
        force_y: fields[3],
        intensity: match schema {
            Schema::Compact => 0.0,
            Schema::Extended => fields[6],
        },
    }
}

//! Windowed density, velocity and flow sampling.

use nasch_core::{CellView, WindowStats};

/// Stretch of cells ending at the measurement point, the last cell of the road.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeasurementWindow {
    start: usize,
    end: usize,
}

impl MeasurementWindow {
    /// Window covering the last third of a road with `length` cells.
    ///
    /// Roads shorter than three cells yield an empty window.
    #[must_use]
    pub const fn for_length(length: usize) -> Self {
        Self {
            start: length - length / 3,
            end: length,
        }
    }

    /// Number of cells inside the window.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    /// Reports whether the window covers no cells.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Index of the first cell inside the window.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// Index of the last cell inside the window, the last cell of the road.
    #[must_use]
    pub const fn measure_point(&self) -> usize {
        self.end.saturating_sub(1)
    }

    /// Samples the window. An empty window, or one without vehicles, reports
    /// zero mean velocity.
    #[must_use]
    pub fn measure(&self, cells: CellView<'_>) -> WindowStats {
        if self.is_empty() {
            return WindowStats::default();
        }

        let (occupied, velocity_sum) = (self.start..self.end)
            .filter_map(|index| cells.speed(index))
            .fold((0_usize, 0_usize), |(count, sum), speed| {
                (count + 1, sum + speed.cells())
            });

        let mean_velocity = if occupied == 0 {
            0.0
        } else {
            velocity_sum as f64 / occupied as f64
        };
        let local_density = occupied as f64 / self.len() as f64;

        WindowStats {
            local_density,
            mean_velocity,
            flow: mean_velocity * local_density,
        }
    }
}

/// Samples the canonical window of the road described by `cells`.
#[must_use]
pub fn measure(cells: CellView<'_>) -> WindowStats {
    MeasurementWindow::for_length(cells.len()).measure(cells)
}

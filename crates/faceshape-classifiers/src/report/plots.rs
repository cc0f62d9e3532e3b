use plotly::common::{ColorScale, ColorScalePalette};
use plotly::layout::{Axis, Layout};
use plotly::{HeatMap, Plot};

use crate::evaluation::ConfusionMatrix;

/// Heatmap of a confusion matrix: predicted labels on x, true labels on y.
pub fn plot_confusion_matrix(cm: &ConfusionMatrix, title: &str) -> Plot {
    let labels = cm.labels().to_vec();
    let z: Vec<Vec<usize>> = cm.counts().to_vec();

    let trace = HeatMap::new(labels.clone(), labels, z)
        .color_scale(ColorScale::Palette(ColorScalePalette::Greens))
        .name("count");

    let layout = Layout::new()
        .title(title)
        .x_axis(Axis::new().title("Predicted"))
        .y_axis(Axis::new().title("True"));

    let mut plot = Plot::new();
    plot.add_trace(trace);
    plot.set_layout(layout);
    plot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heatmap_carries_labels_and_counts() {
        let labels = vec!["oval".to_string(), "round".to_string()];
        let cm = ConfusionMatrix::new(&labels, &labels, &labels).unwrap();
        let html = plot_confusion_matrix(&cm, "cm").to_html();
        assert!(html.contains("Predicted"));
        assert!(html.contains("round"));
    }
}

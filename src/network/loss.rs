// half squared error between predicted and target Q-vectors

#[derive(Debug, Clone, Copy, Default)]
pub struct SquaredError;

impl SquaredError {
    pub fn calculate(&self, y_pred: &[f64], y_true: &[f64]) -> f64 {
        assert_eq!(y_pred.len(), y_true.len(), "prediction and target must have the same length.");
        0.5 * y_pred.iter().zip(y_true).map(|(p, t)| (p - t).powi(2)).sum::<f64>()
    }

    /// dL/dy_pred = y_pred - y_true
    pub fn gradient(&self, y_pred: &[f64], y_true: &[f64]) -> Vec<f64> {
        assert_eq!(y_pred.len(), y_true.len(), "prediction and target must have the same length.");
        y_pred.iter().zip(y_true).map(|(p, t)| p - t).collect()
    }
}

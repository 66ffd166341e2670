//! Tests for the wirings module

use ctrnn_learn::wirings::*;
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fully_connected_edges() {
        let fc = FullyConnected::new(true);
        let mut rng = StdRng::seed_from_u64(1234);
        let edges = fc.edges(5, 3, &mut rng);
        assert_eq!(edges.dim(), (5, 3));
        assert!(edges.iter().all(|e| e.present && e.value.is_none()));
    }

    #[test]
    fn test_fully_connected_without_self_connections() {
        let fc = FullyConnected::new(false);
        let mut rng = StdRng::seed_from_u64(1234);
        assert_eq!(fc.synapse_count(4, 4, &mut rng), 12);
        // Only square groups have a diagonal to drop.
        assert_eq!(fc.synapse_count(4, 3, &mut rng), 12);
    }

    #[test]
    fn test_disconnected() {
        let mut rng = StdRng::seed_from_u64(1234);
        assert_eq!(Disconnected.synapse_count(6, 6, &mut rng), 0);
    }

    #[test]
    fn test_random_wiring_reproducible() {
        let wiring = Random::new(0.5).unwrap();
        let a = wiring.edges(6, 6, &mut StdRng::seed_from_u64(22222));
        let b = wiring.edges(6, 6, &mut StdRng::seed_from_u64(22222));
        assert_eq!(a, b);
        assert_eq!(a.iter().filter(|e| e.present).count(), 18);
    }

    #[test]
    fn test_explicit_edges_keep_pinned_values() {
        let mut matrix = Array2::from_elem((2, 2), Edge::ABSENT);
        matrix[[0, 1]] = Edge::fixed(-0.75);
        matrix[[1, 0]] = Edge::RANDOM;
        let wiring = Explicit::new(matrix.clone());
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(wiring.edges(2, 2, &mut rng), matrix);

        let connection = Connection::from_edges(&matrix, 0.5, &mut rng);
        assert_eq!(connection.weight[[0, 1]], -0.75);
        assert_eq!(connection.weight[[0, 0]], 0.0);
        assert_eq!(connection.synapse_count(), 2);
    }

    #[test]
    fn test_wiring_config_serialization() {
        let config = WiringConfig::Random {
            sparsity_level: 0.25,
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"kind":"random","sparsity_level":0.25}"#);
        let back: WiringConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);

        let full: WiringConfig = serde_json::from_str(r#"{"kind":"full"}"#).unwrap();
        assert_eq!(
            full,
            WiringConfig::Full {
                self_connections: true
            }
        );
    }

    #[test]
    fn test_explicit_config_shape_is_validated() {
        let config = WiringConfig::Explicit {
            edges: vec![vec![Edge::RANDOM; 3]; 2],
        };
        assert!(config.validate("model.context_to_output", 2, 3).is_ok());
        assert!(config.validate("model.context_to_output", 3, 2).is_err());
    }

    #[test]
    fn test_invalid_sparsity() {
        assert!(Random::new(1.0).is_err());
        assert!(Random::new(-0.1).is_err());
        let config = WiringConfig::Random {
            sparsity_level: 1.5,
        };
        assert!(config.validate("model.input_to_context", 2, 2).is_err());
    }
}

mod common;

use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use common::{MockTransport, Recorder};
use stream_mux::{ConnectionId, ConnectionRegistry, Subscription};

#[derive(Clone, Debug)]
enum Op {
    Subscribe,
    /// Disconnect the n-th id handed out so far (modulo), or an id never issued
    Disconnect { pick: usize, known: bool },
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => Just(Op::Subscribe),
        2 => (any::<usize>(), any::<bool>()).prop_map(|(pick, known)| Op::Disconnect { pick, known }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn ids_count_up_regardless_of_disconnects(ops in prop::collection::vec(arb_op(), 1..40)) {
        let mock = Arc::new(MockTransport::new());
        let (recorder, _rx) = Recorder::new();
        let registry = ConnectionRegistry::new("wss://example.test", mock, Arc::new(recorder))
            .unwrap()
            .with_shutdown_grace(Duration::from_millis(50));

        let mut issued = Vec::new();
        for op in ops {
            match op {
                Op::Subscribe => {
                    let id = registry.subscribe(Subscription::new("ch")).unwrap();
                    issued.push(id);
                }
                Op::Disconnect { pick, known: true } if !issued.is_empty() => {
                    let id = issued[pick % issued.len()];
                    let before = registry.connections().contains_key(&id);
                    prop_assert_eq!(registry.disconnect(id).is_ok(), before);
                    prop_assert!(!registry.connections().contains_key(&id));
                }
                Op::Disconnect { pick, .. } => {
                    let never = ConnectionId(10_000 + pick as u64 % 1000);
                    let before = registry.connections().len();
                    prop_assert!(registry.disconnect(never).is_err());
                    prop_assert_eq!(registry.connections().len(), before);
                }
            }
        }

        let expected: Vec<ConnectionId> = (1..=issued.len() as u64).map(ConnectionId).collect();
        prop_assert_eq!(issued, expected);
    }
}

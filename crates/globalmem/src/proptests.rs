use crate::{DeviceTable, MEM_CLEAR};
use proptest::prelude::*;
use std::io::SeekFrom;

#[derive(Debug, Clone)]
enum Op {
    Write(Vec<u8>),
    Read(usize),
    Seek(u64),
    Clear,
}

const MAX_CAPACITY: usize = 512;
const MAX_OPS: usize = 48;

fn op_strategy(capacity: usize) -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => proptest::collection::vec(any::<u8>(), 0..=capacity + 16).prop_map(Op::Write),
        4 => (0usize..=capacity + 16).prop_map(Op::Read),
        2 => (0u64..=capacity as u64).prop_map(Op::Seek),
        1 => Just(Op::Clear),
    ]
}

fn scenario() -> impl Strategy<Value = (usize, Vec<Op>)> {
    (1usize..=MAX_CAPACITY).prop_flat_map(|capacity| {
        (
            Just(capacity),
            proptest::collection::vec(op_strategy(capacity), 0..MAX_OPS),
        )
    })
}

proptest! {
    #[test]
    fn roundtrip_within_capacity(
        (capacity, data) in (1usize..=MAX_CAPACITY)
            .prop_flat_map(|cap| (Just(cap), proptest::collection::vec(any::<u8>(), 0..=cap)))
    ) {
        let table = DeviceTable::new(1, capacity).unwrap();
        let mut h = table.open(0).unwrap();

        prop_assert_eq!(h.write(&data).unwrap(), data.len());
        h.seek(SeekFrom::Start(0)).unwrap();

        let mut back = vec![0u8; data.len()];
        prop_assert_eq!(h.read(&mut back).unwrap(), data.len());
        prop_assert_eq!(back, data);
    }

    #[test]
    fn matches_reference_model((capacity, ops) in scenario()) {
        let table = DeviceTable::new(1, capacity).unwrap();
        let mut h = table.open(0).unwrap();

        let mut model = vec![0u8; capacity];
        let mut pos = 0usize;

        for op in ops {
            match op {
                Op::Write(data) => {
                    let n = data.len().min(capacity - pos);
                    model[pos..pos + n].copy_from_slice(&data[..n]);
                    pos += n;
                    prop_assert_eq!(h.write(&data).unwrap(), n);
                }
                Op::Read(len) => {
                    let n = len.min(capacity - pos);
                    let mut buf = vec![0u8; len];
                    prop_assert_eq!(h.read(&mut buf).unwrap(), n);
                    prop_assert_eq!(&buf[..n], &model[pos..pos + n]);
                    pos += n;
                }
                Op::Seek(target) => {
                    pos = target as usize;
                    prop_assert_eq!(h.seek(SeekFrom::Start(target)).unwrap(), pos);
                }
                Op::Clear => {
                    model.fill(0);
                    h.control(MEM_CLEAR).unwrap();
                }
            }
            prop_assert_eq!(h.position(), pos);
            prop_assert!(h.position() <= capacity);
        }

        prop_assert_eq!(table.region(0).unwrap().snapshot(), model);
    }
}

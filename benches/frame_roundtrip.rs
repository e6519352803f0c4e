use criterion::{black_box, criterion_group, criterion_main, Criterion};
use embercore::websocket::frame::{Frame, OpCode};
use std::io::Cursor;

fn masked_text_frame(payload: &[u8]) -> Vec<u8> {
  let mask = [0x12, 0x34, 0x56, 0x78];
  let mut wire = Vec::new();
  wire.push(0b1000_0001);
  let len = payload.len();
  if len < 126 {
    wire.push(0b1000_0000 | len as u8);
  } else {
    wire.push(0b1000_0000 | 126);
    wire.extend_from_slice(&(len as u16).to_be_bytes());
  }
  wire.extend_from_slice(&mask);
  let mut masked = payload.to_vec();
  embercore::websocket::mask::apply_mask(mask, &mut masked);
  wire.extend_from_slice(&masked);
  wire
}

fn bench_read_small_text_frame(c: &mut Criterion) {
  let wire = masked_text_frame(b"hello world");
  c.bench_function("frame_read_small_text", |b| {
    b.iter(|| {
      let mut cursor = Cursor::new(wire.clone());
      black_box(Frame::read(&mut cursor, 64 << 20).unwrap());
    })
  });
}

fn bench_read_large_binary_frame(c: &mut Criterion) {
  let payload = vec![0x42u8; 64 * 1024];
  let wire = masked_text_frame(&payload);
  c.bench_function("frame_read_64kb", |b| {
    b.iter(|| {
      let mut cursor = Cursor::new(wire.clone());
      black_box(Frame::read(&mut cursor, 64 << 20).unwrap());
    })
  });
}

fn bench_write_frame(c: &mut Criterion) {
  let frame = Frame::new(true, OpCode::Binary, vec![0x01u8; 4096]);
  c.bench_function("frame_write_4kb", |b| {
    b.iter(|| {
      let mut buf = Vec::new();
      black_box(frame.write(&mut buf).unwrap());
    })
  });
}

criterion_group!(
  benches,
  bench_read_small_text_frame,
  bench_read_large_binary_frame,
  bench_write_frame
);
criterion_main!(benches);

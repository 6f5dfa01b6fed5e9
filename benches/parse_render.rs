use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use bytes::Bytes;

use dns_message::buffer::RenderBuffer;
use dns_message::message::Message;
use dns_message::name::DomainName;
use dns_message::types::{Intent, RecordClass, RecordType, Section, COVERS_NONE};

fn push_name(out: &mut Vec<u8>, name: &str) {
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() {
            continue;
        }
        out.push(u8::try_from(label.len()).unwrap());
        out.extend_from_slice(label.as_bytes());
    }
    out.push(0);
}

fn query_wire() -> Vec<u8> {
    let mut wire = vec![0x12, 0x34, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
    push_name(&mut wire, "www.example.com.");
    wire.extend_from_slice(&u16::from(RecordType::A).to_be_bytes());
    wire.extend_from_slice(&u16::from(RecordClass::IN).to_be_bytes());
    wire
}

fn response_wire(answers: u16) -> Vec<u8> {
    let mut wire = vec![0x12, 0x34, 0x81, 0x80, 0, 1, 0, 0, 0, 0, 0, 0];
    wire[6..8].copy_from_slice(&answers.to_be_bytes());
    push_name(&mut wire, "www.example.com.");
    wire.extend_from_slice(&u16::from(RecordType::A).to_be_bytes());
    wire.extend_from_slice(&u16::from(RecordClass::IN).to_be_bytes());
    for i in 0..answers {
        wire.extend_from_slice(&[0xc0, 12]);
        wire.extend_from_slice(&u16::from(RecordType::A).to_be_bytes());
        wire.extend_from_slice(&u16::from(RecordClass::IN).to_be_bytes());
        wire.extend_from_slice(&300u32.to_be_bytes());
        wire.extend_from_slice(&4u16.to_be_bytes());
        wire.extend_from_slice(&u32::from(i).to_be_bytes());
    }
    wire
}

fn render_message(answers: usize) -> Message {
    let mut msg = Message::new(Intent::Render);
    msg.set_id(0x1234);

    let owner = msg.get_temp_name();
    msg.set_name(owner, DomainName::from_dotted_string("www.example.com.").unwrap());
    msg.add_name(owner, Section::Answer).unwrap();

    let list = msg.get_temp_record_list();
    msg.init_record_list(list, RecordType::A, COVERS_NONE, RecordClass::IN, 300);
    for i in 0..answers {
        let record = msg.get_temp_record();
        msg.init_record(
            record,
            RecordClass::IN,
            RecordType::A,
            Bytes::from(u32::try_from(i).unwrap().to_be_bytes().to_vec()),
        );
        msg.append_record(list, record);
    }
    let set = msg.get_temp_record_set();
    msg.bind_record_set(set, list);
    msg.append_record_set(owner, set);

    msg
}

#[allow(non_snake_case)]
fn bench__parse__query(c: &mut Criterion) {
    let wire = query_wire();
    c.bench_function("parse/query", |b| {
        b.iter_batched(
            || Message::new(Intent::Parse),
            |mut msg| {
                msg.parse(black_box(&wire), false).unwrap();
                msg
            },
            BatchSize::SmallInput,
        )
    });
}

#[allow(non_snake_case)]
fn bench__parse__response(c: &mut Criterion) {
    let wire = response_wire(24);
    c.bench_function("parse/response", |b| {
        b.iter_batched(
            || Message::new(Intent::Parse),
            |mut msg| {
                msg.parse(black_box(&wire), false).unwrap();
                msg
            },
            BatchSize::SmallInput,
        )
    });
}

#[allow(non_snake_case)]
fn bench__parse__reset_reuse(c: &mut Criterion) {
    let wire = response_wire(6);
    let mut msg = Message::new(Intent::Parse);
    c.bench_function("parse/reset_reuse", |b| {
        b.iter(|| {
            msg.reset(Intent::Parse);
            msg.parse(black_box(&wire), false).unwrap();
        })
    });
}

#[allow(non_snake_case)]
fn bench__render__response(c: &mut Criterion) {
    c.bench_function("render/response", |b| {
        b.iter_batched(
            || render_message(24),
            |mut msg| {
                msg.render_begin(RenderBuffer::new(1024)).unwrap();
                msg.render_section(Section::Answer, 0, 0).unwrap();
                msg.render_end().unwrap()
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(
    benches,
    bench__parse__query,
    bench__parse__response,
    bench__parse__reset_reuse,
    bench__render__response,
);
criterion_main!(benches);

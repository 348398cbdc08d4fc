use criterion::{Criterion, criterion_group, criterion_main};
use opl3_emulator::{Chip, ChipConfig};
use std::hint::black_box;

const FRAMES: usize = 4096;

/// Nine FM voices holding a chord, with vibrato and tremolo on
fn opl2_chord() -> Chip {
    let mut chip = Chip::new(ChipConfig::opl2(44100)).unwrap();
    chip.write(0x01, 0x20);
    chip.write(0xBD, 0xC0);
    for channel in 0..9u8 {
        let slot = (channel / 3) * 8 + channel % 3;
        chip.write(0x20 + slot, 0xE1);
        chip.write(0x23 + slot, 0x21);
        chip.write(0x40 + slot, 0x10);
        chip.write(0x60 + slot, 0xF4);
        chip.write(0x63 + slot, 0xF2);
        chip.write(0x83 + slot, 0x05);
        chip.write(0xE0 + slot, 0x01);
        chip.write(0xC0 + channel, 0x0C);
        chip.write(0xA0 + channel, 0x40 + channel * 12);
        chip.write(0xB0 + channel, 0x31);
    }
    chip
}

/// Six four operator voices and six two operator voices panned across
/// the stereo field
fn opl3_mixed() -> Chip {
    let mut chip = Chip::new(ChipConfig::opl3(48000)).unwrap();
    chip.write_reg(0x105, 0x01);
    chip.write_reg(0x104, 0x3F);
    for address in [0x000u16, 0x100] {
        for channel in 0..9u16 {
            let slot = (channel / 3) * 8 + channel % 3;
            chip.write_reg(address | (0x20 + slot), 0x21);
            chip.write_reg(address | (0x23 + slot), 0x01);
            chip.write_reg(address | (0x40 + slot), 0x18);
            chip.write_reg(address | (0x60 + slot), 0xF3);
            chip.write_reg(address | (0x63 + slot), 0xF3);
            chip.write_reg(address | (0xE0 + slot), (channel & 7) as u8);
            chip.write_reg(address | (0xC0 + channel), (0x10 << (channel & 1)) as u8 | 0x06);
            chip.write_reg(address | (0xA0 + channel), 0x80);
            chip.write_reg(address | (0xB0 + channel), 0x2D);
        }
    }
    chip
}

fn bench(c: &mut Criterion) {
    let mut chip = opl2_chord();
    let mut out = vec![0i16; FRAMES];
    c.bench_function("OPL2 nine voice chord", |b| {
        b.iter(|| chip.generate(black_box(&mut out), FRAMES).unwrap())
    });

    let mut chip = opl3_mixed();
    let mut out = vec![0i16; FRAMES * 2];
    c.bench_function("OPL3 four operator voices", |b| {
        b.iter(|| chip.generate(black_box(&mut out), FRAMES).unwrap())
    });

    let mut chip = opl2_chord();
    chip.write(0xBD, 0xFF);
    let mut out = vec![0u8; FRAMES * 2];
    c.bench_function("OPL2 rhythm section", |b| {
        b.iter(|| chip.generate_bytes(black_box(&mut out), FRAMES).unwrap())
    });
}

criterion_group!(benches, bench,);
criterion_main!(benches);

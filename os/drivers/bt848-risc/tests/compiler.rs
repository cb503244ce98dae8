use bt848_risc::{
    BufferLayout, BusAddress, BusMapper, CaptureRequest, CompileError, CompiledFrame, Compiler,
    FieldLinks, Instruction, JumpFlags, PAGE_SIZE, PixelFormat, ProgramArea, VideoStandard,
    risc_status,
};

struct FixedBus(u32);

impl BusMapper for FixedBus {
    fn map_contiguous(&self, _ptr: *const u8, _bytes: usize) -> Option<BusAddress> {
        Some(BusAddress::new(self.0))
    }
}

const LINKS: FieldLinks = FieldLinks {
    odd_return: BusAddress::new(0x00F0_0018),
    even_return: BusAddress::new(0x00F0_0030),
};

/// A buffer whose pages are never physically adjacent.
fn scattered(len: u32) -> BufferLayout {
    let pages: Vec<_> = (0..len.div_ceil(PAGE_SIZE))
        .map(|i| BusAddress::new(0x0100_0000 + i * 3 * PAGE_SIZE))
        .collect();
    BufferLayout::from_pages(&pages, len).unwrap()
}

struct Programs {
    odd: ProgramArea,
    even: ProgramArea,
}

impl Programs {
    fn new(words: usize) -> Self {
        Self {
            odd: ProgramArea::new(words, &FixedBus(0x0200_0000)).unwrap(),
            even: ProgramArea::new(words, &FixedBus(0x0300_0000)).unwrap(),
        }
    }

    fn compile(
        &mut self,
        standard: VideoStandard,
        request: &CaptureRequest,
        layout: &BufferLayout,
    ) -> Result<CompiledFrame, CompileError> {
        Compiler::new(standard.timing(), LINKS).compile(
            request,
            layout,
            &mut self.odd,
            &mut self.even,
        )
    }

    fn decode(&self, frame: &CompiledFrame) -> (Vec<Instruction>, Vec<Instruction>) {
        let odd = self
            .odd
            .instructions(frame.odd_words)
            .map(|r| r.unwrap().1)
            .collect();
        let even = self
            .even
            .instructions(frame.even_words)
            .map(|r| r.unwrap().1)
            .collect();
        (odd, even)
    }
}

#[test]
fn compiling_twice_is_byte_identical() {
    let req = CaptureRequest::new(PixelFormat::Yuv420P, 640, 480);
    let layout = scattered(req.frame_bytes());

    let mut a = Programs::new(8192);
    let mut b = Programs::new(8192);
    let fa = a.compile(VideoStandard::Ntsc, &req, &layout).unwrap();
    let fb = b.compile(VideoStandard::Ntsc, &req, &layout).unwrap();
    assert_eq!((fa.odd_words, fa.even_words), (fb.odd_words, fb.even_words));

    for i in 0..fa.odd_words {
        assert_eq!(a.odd.word(i), b.odd.word(i), "odd word {i}");
    }
    for i in 0..fa.even_words {
        assert_eq!(a.even.word(i), b.even.word(i), "even word {i}");
    }
}

#[test]
fn stored_bytes_match_frame_size_for_every_format() {
    for format in PixelFormat::ALL {
        for (w, h) in [(320, 240), (640, 480), (352, 288)] {
            let req = CaptureRequest::new(format, w, h);
            let layout = scattered(req.frame_bytes());
            let mut p = Programs::new(16384);
            let frame = p.compile(VideoStandard::Ntsc, &req, &layout).unwrap();
            let (odd, even) = p.decode(&frame);

            let stored: u32 = odd.iter().chain(&even).map(Instruction::bytes_stored).sum();
            assert_eq!(stored, req.frame_bytes(), "{format:?} {w}x{h}");
            assert_eq!(frame.bytes, stored);
        }
    }
}

#[test]
fn writes_never_cross_a_page() {
    let req = CaptureRequest::new(PixelFormat::Yuv411P, 640, 480);
    let layout = scattered(req.frame_bytes());
    let mut p = Programs::new(8192);
    let frame = p.compile(VideoStandard::Ntsc, &req, &layout).unwrap();
    let (odd, even) = p.decode(&frame);

    let fits = |addr: BusAddress, len: u16| addr.page_offset() + u32::from(len) <= PAGE_SIZE;
    for insn in odd.iter().chain(&even) {
        match *insn {
            Instruction::Write { len, addr, .. } => assert!(fits(addr, len), "{insn}"),
            Instruction::WritePlanar { lens, y, cb, cr, .. } => {
                assert!(fits(y, lens.y), "{insn}");
                assert!(fits(cb, lens.cb), "{insn}");
                assert!(fits(cr, lens.cr), "{insn}");
            }
            Instruction::WriteLuma { lens, y, .. } => assert!(fits(y, lens.y), "{insn}"),
            _ => {}
        }
    }
}

#[test]
fn row_straddling_a_page_is_split() {
    // 720x480 YUYV: 1440 bytes per row, so row 2 starts 2880 bytes in and
    // crosses the first page boundary after 1216 bytes.
    let req = CaptureRequest::new(PixelFormat::Yuyv, 720, 480);
    let layout = scattered(req.frame_bytes());
    let mut p = Programs::new(8192);
    let frame = p.compile(VideoStandard::Ntsc, &req, &layout).unwrap();
    assert!(frame.interlaced);
    let (odd, even) = p.decode(&frame);

    let mut rows = Vec::new();
    for program in [&odd, &even] {
        let mut current: Vec<(BusAddress, u16)> = Vec::new();
        for insn in program.iter() {
            if let Instruction::Write { len, flags, addr } = *insn {
                if flags.sol {
                    assert!(current.is_empty());
                }
                current.push((addr, len));
                if flags.eol {
                    rows.push(std::mem::take(&mut current));
                }
            }
        }
        assert!(current.is_empty());
    }
    assert_eq!(rows.len(), 480);

    for row in &rows {
        let total: u32 = row.iter().map(|&(_, len)| u32::from(len)).sum();
        assert_eq!(total, 1440);
        for &(addr, len) in row {
            assert!(addr.page_offset() + u32::from(len) <= PAGE_SIZE);
        }
    }

    // The odd program writes rows 0, 2, 4, ...; its second row is row 2.
    assert_eq!(rows[1].len(), 2);
    assert_eq!(rows[1][0].1, 1216);
    assert_eq!(rows[1][1].1, 224);
    assert!(rows.iter().filter(|r| r.len() >= 2).count() > 100);
}

#[test]
fn programs_return_into_the_trampoline() {
    let req = CaptureRequest::new(PixelFormat::Rgb565, 640, 480);
    let layout = scattered(req.frame_bytes());
    let mut p = Programs::new(8192);
    let frame = p.compile(VideoStandard::Ntsc, &req, &layout).unwrap();
    let (odd, even) = p.decode(&frame);

    assert_eq!(
        odd.last(),
        Some(&Instruction::Jump {
            target: LINKS.odd_return,
            flags: JumpFlags::PLAIN,
        })
    );
    assert_eq!(
        even.last(),
        Some(&Instruction::Jump {
            target: LINKS.even_return,
            flags: JumpFlags::irq_with_status(risc_status::CAPTURE_DONE),
        })
    );
    assert_eq!(frame.odd, BusAddress::new(0x0200_0000));
    assert_eq!(frame.even, BusAddress::new(0x0300_0000));
}

#[test]
fn subsampled_rows_write_luma_only() {
    let req = CaptureRequest::new(PixelFormat::Yuv410P, 320, 480);
    let layout = BufferLayout::contiguous(BusAddress::new(0x0400_0000), req.frame_bytes()).unwrap();
    let mut p = Programs::new(8192);
    let frame = p.compile(VideoStandard::Ntsc, &req, &layout).unwrap();
    let (odd, even) = p.decode(&frame);

    let count =
        |pred: fn(&Instruction) -> bool| odd.iter().chain(&even).filter(|i| pred(i)).count();
    let planar_rows =
        count(|i| matches!(i, Instruction::WritePlanar { lens, .. } if lens.y == 320));
    let luma_rows = count(|i| matches!(i, Instruction::WriteLuma { lens, .. } if lens.y == 320));
    assert!(planar_rows > 0 && luma_rows > 0);
    assert!(planar_rows + luma_rows <= 480);
}

#[test]
fn overflowing_program_fails_instead_of_truncating() {
    let req = CaptureRequest::new(PixelFormat::Yuyv, 720, 480);
    let layout = scattered(req.frame_bytes());
    let mut p = Programs::new(64);
    assert_eq!(
        p.compile(VideoStandard::Ntsc, &req, &layout),
        Err(CompileError::CapacityExceeded { capacity: 64 })
    );
}

#[test]
fn geometry_is_checked_against_the_standard() {
    let layout = scattered(2 * 1024 * 1024);
    let mut p = Programs::new(8192);

    // Fits PAL but not NTSC.
    let req = CaptureRequest::new(PixelFormat::Grey, 768, 576);
    assert!(p.compile(VideoStandard::PalBdghi, &req, &layout).is_ok());
    assert_eq!(
        p.compile(VideoStandard::Ntsc, &req, &layout),
        Err(CompileError::InvalidGeometry {
            width: 768,
            height: 576
        })
    );
}

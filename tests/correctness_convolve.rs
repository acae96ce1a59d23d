use approx::assert_relative_eq;
use lattice_rs::{
    convolve, convolve_with, gauss, select_convolver_factory, Accumulator, ArrayImg, CellImg,
    ConvolveConfig, ConvolveError, Extension, HalfKernel, Interval, Positionable, Precision,
    RandomAccess, RandomAccessible, RandomAccessibleMut, View, ViewMut, WriteHandle,
};
use num_complex::Complex32;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn random_img(dims: &[usize], seed: u64) -> ArrayImg<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    ArrayImg::from_fn(dims, |_| rng.sample(StandardNormal)).unwrap()
}

#[test]
fn test_identity_kernel_leaves_data_unchanged() {
    init_logger();
    for dims in [vec![11usize], vec![6, 7], vec![4, 5, 3], vec![3, 2, 4, 2]] {
        let src = random_img(&dims, 1);
        let ones: Vec<Vec<f64>> = dims.iter().map(|_| vec![1.0]).collect();
        let mut dst = ArrayImg::<f64>::new(&dims).unwrap();
        convolve(&ones, &src, &mut dst, 3).unwrap();
        assert_eq!(dst.as_slice(), src.as_slice());
    }
}

#[test]
fn test_symmetric_three_tap_kernel() {
    let x: Vec<f64> = vec![2.0, -1.0, 4.0, 0.5, 3.0, 8.0, -2.0, 1.0];
    let (c0, c1, c2) = (0.5, 0.2, 0.05);
    let src = ArrayImg::from_vec(&[8], x.clone()).unwrap();
    let extended = View::new(&src).extend(Extension::Constant(0.0)).unwrap();
    let mut dst = ArrayImg::<f64>::new(&[8]).unwrap();
    convolve(&[vec![c0, c1, c2]], &extended, &mut dst, 1).unwrap();
    for i in 2..6 {
        let expected = c0 * x[i] + c1 * (x[i - 1] + x[i + 1]) + c2 * (x[i - 2] + x[i + 2]);
        assert_eq!(dst.get(&[i as i64]), expected);
    }
}

#[test]
fn test_separable_box_average() {
    let src = ArrayImg::from_fn(&[5, 5], |p| (p[0] * 5 + p[1] * p[1]) as f64).unwrap();
    let extended = View::new(&src).extend(Extension::Border).unwrap();
    let third = 1.0 / 3.0;
    let mut dst = ArrayImg::<f64>::new(&[5, 5]).unwrap();
    convolve(&[vec![third, third], vec![third, third]], &extended, &mut dst, 2).unwrap();

    let mut clamped = extended.random_access();
    for y in 0..5i64 {
        for x in 0..5i64 {
            let mut sum = 0.0;
            for dy in -1..=1 {
                for dx in -1..=1 {
                    clamped.set_position(&[x + dx, y + dy]);
                    sum += clamped.get();
                }
            }
            assert_relative_eq!(dst.get(&[x, y]), sum / 9.0, epsilon = 1e-12);
        }
    }
}

#[test]
fn test_concrete_scenario() {
    let src = ArrayImg::from_vec(&[10], (1..=10).map(f64::from).collect()).unwrap();
    let padded = View::new(&src).extend(Extension::MirrorSingle).unwrap();
    let mut dst = ArrayImg::<f64>::new(&[10]).unwrap();
    convolve(&[vec![0.5, 0.25]], &padded, &mut dst, 1).unwrap();
    // The sample holding 5 has neighbours 4 and 6.
    assert_eq!(dst.get(&[4]), 5.0);
    for i in 1..9 {
        let x = (i + 1) as f64;
        assert_eq!(dst.get(&[i]), 0.5 * x + 0.25 * ((x - 1.0) + (x + 1.0)));
    }
}

#[test]
fn test_buffered_and_direct_are_bit_identical() {
    let half = [0.4, 0.2, 0.07, 0.03];
    let mut rng = StdRng::seed_from_u64(99);
    let line: Vec<f32> = (0..64).map(|_| rng.gen_range(-10.0..10.0)).collect();
    let mut outputs = Vec::new();
    for buffered in [false, true] {
        let factory = select_convolver_factory(<f32 as Accumulator>::PRECISION, buffered);
        assert_eq!(factory.is_buffered(), buffered);
        let mut conv = factory.create::<f32>(&half, 0, 58).unwrap();
        let src = ArrayImg::from_vec(&[64], line.clone()).unwrap();
        let mut dst = ArrayImg::<f32>::new(&[58]).unwrap();
        {
            let writer = dst.writer();
            let mut out = unsafe { writer.access_mut() };
            conv.run(&mut src.random_access(), &mut out);
        }
        outputs.push(dst.into_vec());
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[test]
fn test_thread_count_invariance() {
    init_logger();
    let src = random_img(&[23, 17, 9], 5);
    let extended = View::new(&src).extend(Extension::MirrorDouble).unwrap();
    let half = vec![vec![0.3, 0.2, 0.1, 0.05], vec![0.6, 0.2], vec![0.4, 0.2, 0.1]];
    let mut reference = ArrayImg::<f64>::new(&[23, 17, 9]).unwrap();
    convolve(&half, &extended, &mut reference, 1).unwrap();
    for threads in [2, 3, 8] {
        let mut dst = ArrayImg::<f64>::new(&[23, 17, 9]).unwrap();
        convolve(&half, &extended, &mut dst, threads).unwrap();
        assert_eq!(dst.as_slice(), reference.as_slice(), "threads = {threads}");
    }
}

#[test]
fn test_chunked_buffers_and_target() {
    let src = random_img(&[9, 8, 7], 8);
    let extended = View::new(&src).extend(Extension::Periodic).unwrap();
    let half = vec![vec![0.5, 0.25]; 3];
    let mut flat = ArrayImg::<f64>::new(&[9, 8, 7]).unwrap();
    convolve(&half, &extended, &mut flat, 2).unwrap();

    let mut cells = CellImg::<f64>::new(&[9, 8, 7], 100).unwrap();
    assert!(cells.num_cells() > 1);
    let config = ConvolveConfig::new(4).with_max_flat_len(100);
    convolve_with(&half, &extended, &mut cells, &config).unwrap();
    for z in 0..7 {
        for y in 0..8 {
            for x in 0..9 {
                assert_eq!(cells.get(&[x, y, z]), flat.get(&[x, y, z]));
            }
        }
    }
}

#[test]
fn test_integer_samples_work_in_float() {
    let src = ArrayImg::from_vec(&[6], vec![10u16, 20, 30, 40, 50, 60]).unwrap();
    let extended = View::new(&src).extend(Extension::Border).unwrap();
    let mut dst = ArrayImg::<u16>::new(&[6]).unwrap();
    convolve(&[vec![0.5, 0.25]], &extended, &mut dst, 1).unwrap();
    assert_eq!(dst.into_vec(), vec![13, 20, 30, 40, 50, 58]);
}

#[test]
fn test_complex_samples_use_generic_precision() {
    assert_eq!(<Complex32 as Accumulator>::PRECISION, Precision::Generic);
    let src = ArrayImg::from_fn(&[4, 3], |p| Complex32::new(p[0] as f32, -(p[1] as f32))).unwrap();
    let extended = View::new(&src)
        .extend(Extension::Constant(Complex32::new(0.0, 0.0)))
        .unwrap();
    let mut dst = ArrayImg::<Complex32>::new(&[4, 3]).unwrap();
    convolve(&[vec![1.0], vec![0.5, 0.25]], &extended, &mut dst, 2).unwrap();
    // Interior row y = 1: 0.5 * (x - i) + 0.25 * ((x - 0i) + (x - 2i)) = x - i
    for x in 0..4 {
        assert_eq!(dst.get(&[x, 1]), Complex32::new(x as f32, -1.0));
    }
}

#[test]
fn test_target_window_inside_larger_source() {
    let src = random_img(&[12, 12], 21);
    let half = vec![vec![0.5, 0.2, 0.05], vec![0.5, 0.2, 0.05]];
    let window = Interval::new(&[3, 4], &[8, 7]).unwrap();
    // The window plus its border lies inside the source, no extension needed.
    let mut dst = ArrayImg::<f64>::new(&window.dimensions())
        .unwrap()
        .with_min(window.mins())
        .unwrap();
    convolve(&half, &src, &mut dst, 2).unwrap();

    let extended = View::new(&src).extend(Extension::Border).unwrap();
    let mut full = ArrayImg::<f64>::new(&[12, 12]).unwrap();
    convolve(&half, &extended, &mut full, 2).unwrap();
    for y in 4..=7 {
        for x in 3..=8 {
            assert_eq!(dst.get(&[x, y]), full.get(&[x, y]));
        }
    }
}

#[test]
fn test_gauss_into_region_of_interest() {
    init_logger();
    let src = random_img(&[10, 9], 33);
    let extended = View::new(&src).extend(Extension::MirrorSingle).unwrap();
    let sigmas = [1.2, 0.7];

    let mut full = ArrayImg::<f64>::new(&[10, 9]).unwrap();
    gauss(&sigmas, &extended, &mut full, 2).unwrap();

    let roi = Interval::new(&[2, 3], &[6, 7]).unwrap();
    let mut canvas = ArrayImg::from_fn(&[10, 9], |p| (p[0] * 100 + p[1]) as f64).unwrap();
    let before = canvas.clone();
    {
        let mut target = ViewMut::new(&mut canvas).interval(roi.clone()).unwrap();
        gauss(&sigmas, &extended, &mut target, 3).unwrap();
    }
    for y in 0..9 {
        for x in 0..10 {
            if roi.contains(&[x, y]) {
                assert_eq!(canvas.get(&[x, y]), full.get(&[x, y]));
            } else {
                assert_eq!(canvas.get(&[x, y]), before.get(&[x, y]));
            }
        }
    }
}

#[test]
fn test_gauss_into_translated_view() {
    let src = random_img(&[6, 5], 34);
    let extended = View::new(&src).extend(Extension::Border).unwrap();
    let mut expected = ArrayImg::<f64>::new(&[6, 5]).unwrap();
    gauss(&[0.9, 0.9], &extended, &mut expected, 1).unwrap();

    // Shift the source instead of the target, then write through a view
    // that shifts back.
    let shifted = extended.translate(&[4, -2]).unwrap();
    let mut out = ArrayImg::<f64>::new(&[6, 5]).unwrap();
    {
        let mut target = ViewMut::new(&mut out).translate(&[4, -2]).unwrap();
        gauss(&[0.9, 0.9], &shifted, &mut target, 2).unwrap();
    }
    assert_eq!(out.as_slice(), expected.as_slice());
}

#[test]
fn test_u8_image_smoothed_into_f64() {
    let bytes = ArrayImg::from_fn(&[8, 8], |p| ((p[0] * 31 + p[1] * 17) % 256) as u8).unwrap();
    let extended = View::new(&bytes).extend(Extension::MirrorDouble).unwrap();
    let mut smooth = ArrayImg::<f64>::new(&[8, 8]).unwrap();
    gauss(&[1.0, 1.0], &extended, &mut smooth, 2).unwrap();

    let floats = ArrayImg::from_fn(&[8, 8], |p| bytes.get(p) as f64).unwrap();
    let extended = View::new(&floats).extend(Extension::MirrorDouble).unwrap();
    let mut reference = ArrayImg::<f64>::new(&[8, 8]).unwrap();
    gauss(&[1.0, 1.0], &extended, &mut reference, 2).unwrap();
    assert_eq!(smooth.as_slice(), reference.as_slice());
}

#[test]
fn test_unbounded_target_rejected() {
    let src = random_img(&[4], 3);
    let mut unbounded = Unbounded;
    let err = convolve(&[vec![1.0]], &src, &mut unbounded, 1).err().unwrap();
    assert!(matches!(
        err,
        ConvolveError::View(lattice_rs::ViewError::Unbounded)
    ));
}

#[test]
fn test_gaussian_kernel_helper() {
    let k = HalfKernel::gaussian(1.5).unwrap();
    assert_eq!(k.len(), 6);
    assert_relative_eq!(k.to_full().iter().sum::<f64>(), 1.0, epsilon = 1e-12);
}

/// A target with no bounds, which the engine must reject.
struct Unbounded;

struct NoAccess;

impl lattice_rs::Localizable for NoAccess {
    fn num_dimensions(&self) -> usize {
        1
    }

    fn position(&self) -> &[i64] {
        &[0]
    }
}

impl lattice_rs::Positionable for NoAccess {
    fn move_by(&mut self, _distance: i64, _d: usize) {}
}

impl lattice_rs::RandomAccess for NoAccess {
    type Sample = f64;

    fn get(&self) -> f64 {
        0.0
    }
}

impl lattice_rs::RandomAccessMut for NoAccess {
    fn set(&mut self, _value: f64) {}
}

impl lattice_rs::WriteHandle for NoAccess {
    type Sample = f64;
    type AccessMut = NoAccess;

    unsafe fn access_mut(&self) -> NoAccess {
        NoAccess
    }
}

impl lattice_rs::RandomAccessible for Unbounded {
    type Sample = f64;
    type Access<'a> = NoAccess;

    fn num_dimensions(&self) -> usize {
        1
    }

    fn bounds(&self) -> Option<Interval> {
        None
    }

    fn random_access(&self) -> NoAccess {
        NoAccess
    }
}

impl lattice_rs::RandomAccessibleMut for Unbounded {
    type Writer<'a> = NoAccess;

    fn writer(&mut self) -> NoAccess {
        NoAccess
    }
}

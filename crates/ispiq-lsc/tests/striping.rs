use std::{cell::Cell, rc::Rc};

use ispiq_hw::{CmdBuffer, Command, DmiBuffer};
use ispiq_lsc::{
    algo::{AlgorithmError, CorrectionConfig},
    AlgorithmLoader, BgStats, BgStatsConfig, ChannelValues, CorrectionAlgorithm, FrameInput,
    GridAlgorithm, LensShadingModule, LscError, LscModuleConfig, SensorGeometry, StripeContext,
    StripingPlan,
};
use ispiq_tuning::{
    GainTables, LscChromatix, LscEnableSection, LscRegionData, StaticTuning, TintlessChromatix,
    TintlessEnableSection, TriggerData, TuningNode, MESH_ROLLOFF_SIZE,
};

struct Counting {
    calls: Rc<Cell<usize>>,
}

impl CorrectionAlgorithm for Counting {
    fn process(
        &mut self,
        _config: &CorrectionConfig,
        _stats: &BgStats,
        input: &GainTables,
    ) -> Result<GainTables, AlgorithmError> {
        self.calls.set(self.calls.get() + 1);
        Ok(input.clone())
    }
}

struct Loader {
    calls: Rc<Cell<usize>>,
}

impl AlgorithmLoader for Loader {
    fn load_correction(&self) -> Option<Box<dyn CorrectionAlgorithm>> {
        Some(Box::new(Counting {
            calls: self.calls.clone(),
        }))
    }

    fn load_grid(&self) -> Option<Box<dyn GridAlgorithm>> {
        None
    }
}

fn tuning() -> StaticTuning {
    let lsc = LscChromatix {
        symbol_table_id: 1,
        enable: LscEnableSection {
            rolloff_enable: true,
            alsc_enable: false,
        },
        control_method: Default::default(),
        private_information: Default::default(),
        reserve: Default::default(),
        core: TuningNode::Leaf(LscRegionData {
            gains: GainTables::filled(MESH_ROLLOFF_SIZE, 1.25),
            alsc: Default::default(),
        }),
        golden: vec![],
    };
    let tintless = TintlessChromatix {
        symbol_table_id: 2,
        enable: TintlessEnableSection { tintless_en: true },
        ..Default::default()
    };
    StaticTuning::new(Some(lsc), Some(tintless))
}

fn stats() -> BgStats {
    BgStats {
        config: BgStatsConfig {
            channel_gain_threshold: ChannelValues::splat(1023),
            ..Default::default()
        },
        regions: vec![ChannelValues::splat(64.0); 16 * 12],
    }
}

fn module(calls: &Rc<Cell<usize>>) -> Result<LensShadingModule, LscError> {
    let _ = env_logger::builder().is_test(true).try_init();
    LensShadingModule::new(
        LscModuleConfig::default(),
        &Loader {
            calls: calls.clone(),
        },
    )
}

fn stripe_input<'a>(
    request_id: u64,
    cct: f32,
    tuning: &'a StaticTuning,
    stats: &'a BgStats,
    stripe: StripeContext,
) -> FrameInput<'a> {
    let mut input = FrameInput::new(
        request_id,
        SensorGeometry::full_resolution(4000, 3000),
        TriggerData {
            color_temperature: cct,
            ..Default::default()
        },
    )
    .with_tuning(tuning);
    input.tintless_stats = Some(stats);
    input.stripe = Some(stripe);
    input
}

fn stripe_contexts(plan: &StripingPlan) -> Vec<StripeContext> {
    plan.stripes.iter().map(|s| s.stripe).collect()
}

fn mesh_start_word(cmd: &CmdBuffer) -> Result<u32, Box<dyn std::error::Error>> {
    match cmd.commands()?.into_iter().next() {
        Some(Command::RegRange { values, .. }) => Ok(values[6]),
        other => Err(format!("unexpected first command {other:?}").into()),
    }
}

#[test]
fn two_stripes_share_one_calculation() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Rc::new(Cell::new(0));
    let mut module = module(&calls)?;
    let tuning = tuning();
    let stats = stats();
    let dmi_len = module.dmi_length_dwords();
    let mut dmi = DmiBuffer::new(7, 2 * dmi_len);

    let frame = stripe_input(1, 5000.0, &tuning, &stats, StripeContext::default());
    let plan = module.prepare_striping(&frame, 2)?;
    assert!(plan.changed);
    assert!(plan.enable);
    assert_eq!(plan.stripes.len(), 2);
    assert_eq!(plan.stripes[0].bx_d1, 8);
    assert_eq!(plan.stripes[1].lx_start, 8);
    assert_eq!(plan.stripes[1].bx_d1, 0);

    let stripes = stripe_contexts(&plan);
    let mut cmds = [
        CmdBuffer::new(module.cmd_size_dwords()),
        CmdBuffer::new(module.cmd_size_dwords()),
    ];

    let first = module.execute(
        &stripe_input(1, 5000.0, &tuning, &stats, stripes[0]),
        &mut cmds[0],
        &mut dmi,
    )?;
    assert!(first.recomputed);
    assert_eq!(first.bank.index(), 0);

    let second = module.execute(
        &stripe_input(1, 5000.0, &tuning, &stats, stripes[1]),
        &mut cmds[1],
        &mut dmi,
    )?;
    assert!(second.recomputed);
    assert_eq!(second.bank.index(), 1);
    assert_eq!(calls.get(), 1);

    assert_eq!(mesh_start_word(&cmds[0])?, 8 << 16);
    assert_eq!(mesh_start_word(&cmds[1])?, 8);

    let offsets: Vec<u32> = cmds[1]
        .commands()?
        .into_iter()
        .filter_map(|c| match c {
            Command::Dmi(write) => Some(write.offset_bytes),
            _ => None,
        })
        .collect();
    let base = (dmi_len * 4) as u32;
    assert_eq!(offsets, vec![base, base + 221 * 4, base + 2 * 221 * 4]);
    assert_eq!(dmi.as_slice()[..dmi_len], dmi.as_slice()[dmi_len..]);

    // unchanged frame: nothing is written
    let frame = stripe_input(2, 5000.0, &tuning, &stats, StripeContext::default());
    let plan = module.prepare_striping(&frame, 2)?;
    assert!(!plan.changed);
    assert_eq!(plan.stripes.len(), 2);
    for stripe in stripe_contexts(&plan) {
        let mut cmd = CmdBuffer::new(module.cmd_size_dwords());
        let output = module.execute(&stripe_input(2, 5000.0, &tuning, &stats, stripe), &mut cmd, &mut dmi)?;
        assert!(!output.recomputed);
        assert!(cmd.is_empty());
    }
    assert_eq!(module.bank().index(), 1);
    assert_eq!(calls.get(), 1);

    Ok(())
}

#[test]
fn stripes_without_prepare_reuse_the_first_decision() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Rc::new(Cell::new(0));
    let mut module = module(&calls)?;
    let tuning = tuning();
    let stats = stats();
    let dmi_len = module.dmi_length_dwords();
    let mut dmi = DmiBuffer::new(0, 2 * dmi_len);

    for (request_id, cct) in [(1, 5000.0), (2, 3000.0)] {
        let stripes = ispiq_lsc::stripe::split(4000, 2)?;
        for stripe in stripes {
            let mut cmd = CmdBuffer::new(module.cmd_size_dwords());
            let output = module.execute(
                &stripe_input(request_id, cct, &tuning, &stats, stripe),
                &mut cmd,
                &mut dmi,
            )?;
            assert!(output.dependency_changed);
            assert!(output.recomputed);
        }
    }
    assert_eq!(calls.get(), 2);
    assert_eq!(module.bank().index(), 0);

    Ok(())
}

#[test]
fn stripe_index_out_of_range() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Rc::new(Cell::new(0));
    let mut module = module(&calls)?;
    let tuning = tuning();
    let stats = stats();
    let mut cmd = CmdBuffer::new(module.cmd_size_dwords());
    let mut dmi = DmiBuffer::new(0, 2 * module.dmi_length_dwords());

    let stripe = StripeContext {
        index: 2,
        count: 2,
        x_offset: 4000,
        width: 0,
    };
    let result = module.execute(&stripe_input(1, 5000.0, &tuning, &stats, stripe), &mut cmd, &mut dmi);
    assert!(matches!(result, Err(LscError::InvalidStripe(2, 2))));
    assert!(cmd.is_empty());

    Ok(())
}

#[test]
fn unsplittable_frame_disables_the_request() -> Result<(), Box<dyn std::error::Error>> {
    let calls = Rc::new(Cell::new(0));
    let mut module = module(&calls)?;
    let tuning = tuning();
    let stats = stats();
    let mut dmi = DmiBuffer::new(0, 2 * module.dmi_length_dwords());

    let frame = stripe_input(1, 5000.0, &tuning, &stats, StripeContext::default());
    let plan = module.prepare_striping(&frame, 0)?;
    assert_eq!(plan, StripingPlan::default());
    assert!(!module.is_enabled());

    let stripe = StripeContext {
        index: 0,
        count: 1,
        x_offset: 0,
        width: 4000,
    };
    let mut cmd = CmdBuffer::new(module.cmd_size_dwords());
    let output = module.execute(&stripe_input(1, 5000.0, &tuning, &stats, stripe), &mut cmd, &mut dmi)?;
    assert!(!output.recomputed);
    assert!(!output.rolloff_enable);
    assert_eq!(cmd.commands()?.len(), 1);
    assert_eq!(calls.get(), 0);

    // the next request plans normally
    let frame = stripe_input(2, 5000.0, &tuning, &stats, StripeContext::default());
    let plan = module.prepare_striping(&frame, 2)?;
    assert!(plan.enable);
    assert!(plan.changed);
    assert_eq!(plan.stripes.len(), 2);

    Ok(())
}

#![no_main]
#![no_std]

use sonar_play as _; // global logger + panicking-behavior + memory layout

#[rtic::app(device = nrf52840_hal::pac)]
mod app {
    use hcsr04::{Clock, Config, Duration, Instant, PulseSource, PulseTimer, Scheduler};
    use nrf52840_hal::{
        clocks::Clocks,
        gpio::{p0::Parts, Level, Output, Pin, PushPull},
        gpiote::Gpiote,
        pac::TIMER0,
        Delay,
    };
    use sonar_play::mono::{ExtU32, MonoTimer};

    /// Air temperature used for the speed of sound, until a thermometer is wired up.
    const AMBIENT_CELSIUS: f64 = 20.0;

    #[monotonic(binds = TIMER0, default = true)]
    type MyMono = MonoTimer<TIMER0>;

    #[shared]
    struct Shared {
        pulse: PulseTimer,
    }

    #[local]
    struct Local {
        gpiote: Gpiote,
        scheduler: Scheduler<Pin<Output<PushPull>>, Delay, MonoClock>,
    }

    #[init]
    fn init(ctx: init::Context) -> (Shared, Local, init::Monotonics) {
        let _clocks = Clocks::new(ctx.device.CLOCK).enable_ext_hfosc();
        let mono = MonoTimer::new(ctx.device.TIMER0);

        let p0 = Parts::new(ctx.device.P0);
        let echo_pin = p0.p0_04.into_pulldown_input().degrade();
        let trig_pin = p0.p0_03.into_push_pull_output(Level::Low).degrade();

        let gpiote = Gpiote::new(ctx.device.GPIOTE);
        gpiote
            .channel0()
            .input_pin(&echo_pin)
            .toggle() // Trigger on both rising and falling edges
            .enable_interrupt();

        let config = Config {
            interval: 60.millis(),
            ..Config::default()
        };
        let scheduler = Scheduler::new(trig_pin, Delay::new(ctx.core.SYST), MonoClock, config);
        defmt::info!("Ranging every {} us", scheduler.config().interval.ticks());

        (
            Shared {
                pulse: PulseTimer::new(),
            },
            Local { gpiote, scheduler },
            init::Monotonics(mono),
        )
    }

    #[idle(shared = [pulse], local = [scheduler])]
    fn idle(mut ctx: idle::Context) -> ! {
        let scheduler = ctx.local.scheduler;
        loop {
            let now = monotonics::now();
            let mut echo = Echo(&mut ctx.shared.pulse);
            if let Some(distance) = scheduler.tick(now, AMBIENT_CELSIUS, &mut echo) {
                defmt::info!("Distance: {} cm", distance.cm());
                defmt::debug!("samples: {}", defmt::Display2Format(&scheduler.samples_csv()));
            }
        }
    }

    #[task(binds = GPIOTE, shared = [pulse], local = [gpiote])]
    fn on_echo(mut ctx: on_echo::Context) {
        let now = monotonics::now();
        ctx.local.gpiote.reset_events();
        ctx.shared.pulse.lock(|pulse| pulse.on_edge(now));
    }

    pub struct MonoClock;

    impl Clock for MonoClock {
        fn now(&mut self) -> Instant {
            monotonics::now()
        }
    }

    /// Reads the shared pulse timer with the echo interrupt masked.
    struct Echo<'a, M>(&'a mut M);

    impl<M> PulseSource for Echo<'_, M>
    where
        M: rtic::Mutex<T = PulseTimer>,
    {
        fn take_if_ready(&mut self) -> Option<Duration> {
            self.0.lock(|pulse| pulse.take_if_ready())
        }

        fn reset(&mut self) {
            self.0.lock(|pulse| pulse.reset())
        }
    }
}

/// Where the startup banner goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerMode {
    Off,
    Console,
}

pub(crate) const DEFAULT_BANNER: &str = r"
                         _
 ____ __ _ _ ___ _  _| |_
(_-< '_ \ '_/ _ \ || |  _|
/__/ .__/_| \___/\_,_|\__|
   |_|";

pub(crate) fn print(text: &str) {
    for line in text.lines() {
        println!("{line}");
    }
    println!(":: sprout ::        (v{})", crate::VERSION);
    println!();
}

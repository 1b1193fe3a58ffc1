
mod control;
mod inspect;

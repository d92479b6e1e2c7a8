//! Built-in behavior classes. Constructors are crate-private; everything
//! outside the crate goes through [`crate::BehaviorFactory`].

pub(crate) mod fetch_cube;
pub(crate) mod play_animation;
pub(crate) mod react_to_stack;
pub(crate) mod sequence;
pub(crate) mod wait;

use crate::container::BehaviorFactory;

pub use fetch_cube::FAILED_PICKUPS;

pub(crate) fn register_builtins(factory: &mut BehaviorFactory) {
    factory.insert_builtin("Wait", |config| {
        Ok(Box::new(wait::WaitBehavior::from_config(config)?))
    });
    factory.insert_builtin("PlayAnimation", |config| {
        Ok(Box::new(play_animation::PlayAnimationBehavior::from_config(config)?))
    });
    factory.insert_builtin("ReactToStackOfCubes", |config| {
        Ok(Box::new(react_to_stack::ReactToStackBehavior::from_config(config)?))
    });
    factory.insert_builtin("FetchCube", |config| {
        Ok(Box::new(fetch_cube::FetchCubeBehavior::from_config(config)?))
    });
    factory.insert_builtin("Sequence", |config| {
        Ok(Box::new(sequence::SequenceBehavior::from_config(config)?))
    });
}
